use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rama::{
    graceful::ShutdownGuard,
    telemetry::tracing::{self, Instrument as _},
};

use super::{
    LimiterClosed, LimiterConfigError, Permit, PermitSource,
    store::{PermitRefill, PermitStore, permit_store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingProxyConfig {
    /// Emit a progress event every time this many permits were forwarded.
    pub log_every: u64,
    /// Capacity of the downstream store; kept small so that the
    /// forwarding loop is paced by the consumers.
    pub buffer: usize,
}

impl Default for LoggingProxyConfig {
    fn default() -> Self {
        Self {
            log_every: 2000,
            buffer: 1,
        }
    }
}

impl LoggingProxyConfig {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every,
            ..Default::default()
        }
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }
}

/// Permit source relaying permits from an upstream source, 1:1,
/// while logging throughput progress.
#[derive(Clone)]
pub struct LoggingProxy {
    store: Arc<PermitStore>,
    counters: Arc<ForwardCounters>,
}

#[derive(Debug, Default)]
struct ForwardCounters {
    received: AtomicU64,
    forwarded: AtomicU64,
}

impl std::fmt::Debug for LoggingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingProxy")
            .field("buffer", &self.store.capacity())
            .field("received", &self.received())
            .field("forwarded", &self.forwarded())
            .finish()
    }
}

impl LoggingProxy {
    /// Start forwarding permits from `upstream` until shutdown
    /// is initiated for `guard` or `upstream` closes.
    pub fn try_new<S: PermitSource>(
        guard: ShutdownGuard,
        upstream: S,
        cfg: LoggingProxyConfig,
    ) -> Result<Self, LimiterConfigError> {
        if cfg.log_every == 0 {
            return Err(LimiterConfigError::ZeroLogThreshold);
        }
        if cfg.buffer == 0 {
            return Err(LimiterConfigError::ZeroProxyBuffer);
        }

        let (refill, store) = permit_store(cfg.buffer);
        let counters = Arc::new(ForwardCounters::default());

        let span = tracing::debug_span!("logging proxy", log_every = cfg.log_every);
        guard.spawn_task_fn({
            let counters = counters.clone();
            move |guard| {
                forward_loop(guard, upstream, refill, counters, cfg.log_every).instrument(span)
            }
        });

        Ok(Self {
            store: Arc::new(store),
            counters,
        })
    }

    /// Permits taken from upstream so far.
    pub fn received(&self) -> u64 {
        self.counters.received.load(Ordering::Acquire)
    }

    /// Permits handed over to the downstream store so far.
    pub fn forwarded(&self) -> u64 {
        self.counters.forwarded.load(Ordering::Acquire)
    }
}

impl PermitSource for LoggingProxy {
    fn acquire(&self) -> impl Future<Output = Result<Permit, LimiterClosed>> + Send + '_ {
        self.store.acquire()
    }

    fn try_acquire(&self) -> Option<Permit> {
        self.store.try_acquire()
    }
}

async fn forward_loop<S: PermitSource>(
    guard: ShutdownGuard,
    upstream: S,
    downstream: PermitRefill,
    counters: Arc<ForwardCounters>,
    log_every: u64,
) {
    let mut sample = 0;

    loop {
        let permit = tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit logging proxy: guard shutdown");
                return;
            }
            result = upstream.acquire() => match result {
                Ok(permit) => permit,
                Err(LimiterClosed) => {
                    tracing::debug!("exit logging proxy: upstream closed");
                    return;
                }
            },
        };
        counters.received.fetch_add(1, Ordering::AcqRel);

        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit logging proxy: guard shutdown");
                return;
            }
            result = downstream.push(permit) => {
                if result.is_err() {
                    tracing::debug!("exit logging proxy: all consumers dropped");
                    return;
                }
            }
        }
        counters.forwarded.fetch_add(1, Ordering::AcqRel);

        sample += 1;
        if sample >= log_every {
            tracing::info!(value = log_every, "permits forwarded");
            sample = 0;
        }
    }
}
