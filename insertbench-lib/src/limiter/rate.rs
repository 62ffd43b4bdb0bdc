use std::sync::Arc;

use rama::{
    graceful::ShutdownGuard,
    telemetry::tracing::{self, Instrument as _},
};
use tokio::time::{MissedTickBehavior, interval};

use super::{
    LimiterClosed, LimiterConfigError, Permit, PermitSource,
    interval::{RefillSchedule, solve},
    store::{PermitRefill, PermitStore, permit_store},
};

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Permits issued per second.
    pub target_rate: u32,
    /// Maximum number of buffered permits (burst size).
    ///
    /// Defaults to the permits issued per timer wakeup,
    /// see [`RefillSchedule::tokens_per_wakeup`].
    pub capacity: Option<u32>,
}

impl RateLimiterConfig {
    pub fn new(target_rate: u32) -> Self {
        Self {
            target_rate,
            capacity: None,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Token bucket style limiter backed by a bounded permit store.
///
/// A background loop pushes `tokens_per_interval` permits into the store on
/// every tick of the solved interval, skipping whatever does not fit.
/// Cloning is cheap, all clones share the same store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<PermitStore>,
    schedule: RefillSchedule,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("schedule", &self.schedule)
            .field("capacity", &self.store.capacity())
            .finish()
    }
}

impl RateLimiter {
    /// Solve the refill schedule for the configured rate and start the refill loop.
    ///
    /// The loop runs until shutdown is initiated for `guard`.
    pub fn try_new(guard: ShutdownGuard, cfg: RateLimiterConfig) -> Result<Self, LimiterConfigError> {
        let schedule = solve(cfg.target_rate)?;
        let capacity = cfg.capacity.unwrap_or(schedule.tokens_per_wakeup());

        tracing::info!(
            target_rate = cfg.target_rate,
            interval = ?schedule.interval(),
            tokens_per_interval = schedule.tokens_per_interval(),
            capacity,
            "rate limiter schedule solved",
        );

        Self::try_new_with_schedule(guard, schedule, capacity)
    }

    /// Start a limiter with an explicit refill schedule.
    pub fn try_new_with_schedule(
        guard: ShutdownGuard,
        schedule: RefillSchedule,
        capacity: u32,
    ) -> Result<Self, LimiterConfigError> {
        if capacity < 1 {
            return Err(LimiterConfigError::ZeroCapacity);
        }

        let (refill, store) = permit_store(capacity as usize);
        let span = tracing::debug_span!(
            "rate limiter refill",
            interval = ?schedule.interval(),
            tokens = schedule.tokens_per_interval(),
        );
        guard.spawn_task_fn(move |guard| refill_loop(guard, refill, schedule).instrument(span));

        Ok(Self {
            store: Arc::new(store),
            schedule,
        })
    }

    pub fn schedule(&self) -> RefillSchedule {
        self.schedule
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    /// Number of permits currently buffered, never above [`Self::capacity`].
    pub fn store_len(&self) -> usize {
        self.store.len()
    }
}

impl PermitSource for RateLimiter {
    fn acquire(&self) -> impl Future<Output = Result<Permit, LimiterClosed>> + Send + '_ {
        self.store.acquire()
    }

    fn try_acquire(&self) -> Option<Permit> {
        self.store.try_acquire()
    }
}

async fn refill_loop(guard: ShutdownGuard, refill: PermitRefill, schedule: RefillSchedule) {
    let tokens = schedule.tokens_per_interval();

    let mut ticker = interval(schedule.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!("exit rate limiter refill loop: guard shutdown");
                return;
            }
            _ = ticker.tick() => (),
        }

        match refill.top_up(tokens) {
            Ok(pushed) if pushed < tokens => {
                tracing::trace!(pushed, skipped = tokens - pushed, "permit store full");
            }
            Ok(_) => (),
            Err(LimiterClosed) => {
                tracing::debug!("exit rate limiter refill loop: all consumers dropped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::interval::TIMER_RESOLUTION;
    use rama::graceful::Shutdown;
    use std::time::Duration;
    use tokio::{
        sync::oneshot,
        task::yield_now,
        time::{self, Instant},
    };

    fn new_shutdown() -> (oneshot::Sender<()>, Shutdown) {
        let (tx, rx) = oneshot::channel::<()>();
        let shutdown = Shutdown::new(async move {
            let _ = rx.await;
        });
        (tx, shutdown)
    }

    async fn settle() {
        for _ in 0..8 {
            yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let (_tx, shutdown) = new_shutdown();

        let err = RateLimiter::try_new(shutdown.guard(), RateLimiterConfig::new(0)).unwrap_err();
        assert_eq!(err, LimiterConfigError::ZeroTargetRate);

        let err = RateLimiter::try_new(
            shutdown.guard(),
            RateLimiterConfig::new(60).with_capacity(0),
        )
        .unwrap_err();
        assert_eq!(err, LimiterConfigError::ZeroCapacity);
    }

    #[tokio::test]
    async fn test_capacity_defaults_to_tokens_per_wakeup() {
        let (_tx, shutdown) = new_shutdown();

        let limiter = RateLimiter::try_new(shutdown.guard(), RateLimiterConfig::new(60)).unwrap();
        assert_eq!(limiter.schedule().interval(), Duration::from_millis(100));
        assert_eq!(limiter.capacity(), 6);

        let limiter =
            RateLimiter::try_new(shutdown.guard(), RateLimiterConfig::new(20_000)).unwrap();
        assert_eq!(limiter.schedule().interval(), Duration::from_micros(100));
        assert_eq!(limiter.capacity(), 20);

        let limiter = RateLimiter::try_new(
            shutdown.guard(),
            RateLimiterConfig::new(20_000).with_capacity(5),
        )
        .unwrap();
        assert_eq!(limiter.capacity(), 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_refill_does_not_overflow_capacity() {
        time::pause();
        let (_tx, shutdown) = new_shutdown();

        let schedule = RefillSchedule::new(Duration::from_millis(100), 20).unwrap();
        let limiter = RateLimiter::try_new_with_schedule(shutdown.guard(), schedule, 20).unwrap();

        // first tick fires immediately
        settle().await;
        assert_eq!(limiter.store_len(), 20);

        for _ in 0..15 {
            assert!(limiter.try_acquire().is_some());
        }
        assert_eq!(limiter.store_len(), 5);

        time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(limiter.store_len(), 20);

        // idle ticks never push the store beyond its capacity
        for _ in 0..10 {
            time::advance(Duration::from_millis(100)).await;
            settle().await;
            assert_eq!(limiter.store_len(), 20);
        }

        for _ in 0..20 {
            assert!(limiter.try_acquire().is_some());
        }
        assert!(limiter.try_acquire().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_delivered_permits_track_target_rate() {
        time::pause();
        let (_tx, shutdown) = new_shutdown();

        let limiter = RateLimiter::try_new(shutdown.guard(), RateLimiterConfig::new(60)).unwrap();
        let tokens_per_tick = limiter.schedule().tokens_per_interval() as usize;

        let window = Duration::from_secs(3);
        let deadline = Instant::now() + window;
        let mut delivered = 0usize;
        while let Ok(permit) = time::timeout_at(deadline, limiter.acquire()).await {
            let _ = permit.unwrap();
            delivered += 1;
        }

        let expected = 60 * window.as_secs() as usize;
        assert!(
            delivered.abs_diff(expected) <= tokens_per_tick,
            "delivered = {delivered}; expected = {expected}",
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_sub_millisecond_schedule_tracks_target_rate() {
        time::pause();
        let (_tx, shutdown) = new_shutdown();

        let limiter =
            RateLimiter::try_new(shutdown.guard(), RateLimiterConfig::new(20_000)).unwrap();
        assert!(limiter.schedule().interval() < TIMER_RESOLUTION);
        // the ticks of one timer wakeup are refilled together
        let tokens_per_wakeup = limiter.schedule().tokens_per_wakeup() as usize;

        let window = Duration::from_secs(3);
        let deadline = Instant::now() + window;
        let mut delivered = 0usize;
        while let Ok(permit) = time::timeout_at(deadline, limiter.acquire()).await {
            let _ = permit.unwrap();
            delivered += 1;
        }

        let expected = 20_000 * window.as_secs() as usize;
        assert!(
            delivered.abs_diff(expected) <= tokens_per_wakeup,
            "delivered = {delivered}; expected = {expected}",
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_late_ticks_are_caught_up() {
        time::pause();
        let (_tx, shutdown) = new_shutdown();

        let schedule = RefillSchedule::new(Duration::from_millis(10), 1).unwrap();
        let limiter = RateLimiter::try_new_with_schedule(shutdown.guard(), schedule, 10).unwrap();
        settle().await;
        assert!(limiter.try_acquire().is_some());

        // a stalled refill loop fires the missed ticks once it runs again
        time::advance(Duration::from_millis(50)).await;
        settle().await;
        assert_eq!(limiter.store_len(), 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_consumers_share_permits() {
        time::pause();
        let (_tx, shutdown) = new_shutdown();

        let schedule = RefillSchedule::new(Duration::from_millis(10), 5).unwrap();
        let limiter = RateLimiter::try_new_with_schedule(shutdown.guard(), schedule, 5).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let _permit = limiter.acquire().await.unwrap();
                }
            }));
        }

        let start = Instant::now();
        for handle in handles {
            handle.await.unwrap();
        }

        // 200 permits at 5 per 10ms need at least 39 refill ticks after the first
        assert!(start.elapsed() >= Duration::from_millis(390));
    }

    #[tokio::test]
    async fn test_shutdown_stops_refill_and_closes_store() {
        let (tx, shutdown) = new_shutdown();

        let schedule = RefillSchedule::new(Duration::from_millis(5), 2).unwrap();
        let limiter = RateLimiter::try_new_with_schedule(shutdown.guard(), schedule, 2).unwrap();

        tx.send(()).unwrap();
        shutdown.shutdown().await;

        // buffered permits can still be drained, then the store reports closure
        let mut drained = 0;
        loop {
            match limiter.acquire().await {
                Ok(_permit) => drained += 1,
                Err(LimiterClosed) => break,
            }
        }
        assert!(drained <= 2);
    }
}
