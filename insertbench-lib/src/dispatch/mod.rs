//! Per-user generation and submission of synthetic events.
//!
//! Every user gets its own task (no pooling): it walks a jittered
//! [`Timeline`] over the configured window, turns every timestamp into an
//! [`Event`] with a random payload and submits the events in [`Batches`].
//! Throughput is bounded by the permits the submitter consumes, not by the
//! number of tasks.

use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{Request, Response},
    telemetry::tracing::{self, Instrument as _},
};
use rand::{SeedableRng as _, rngs::StdRng};
use tokio::task::JoinSet;

use crate::{
    data::random_payload,
    limiter::{LimiterClosed, PermitSource},
    submit::Submitter,
};

mod batch;
mod event;
mod timeline;


pub use self::{
    batch::Batches,
    event::{Batch, Event},
    timeline::Timeline,
};

/// Generation parameters shared by all users of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// End (exclusive) of the generated window.
    pub reference: SystemTime,
    /// Length of the generated window, ending at `reference`.
    pub window: Duration,
    /// Base distance between two events of a user.
    pub step: Duration,
    /// Upper bound (inclusive) of the step multiplier.
    pub max_jitter: u32,
    /// Maximum number of events per submitted batch.
    pub batch_size: usize,
}

impl DispatchConfig {
    pub const DEFAULT_MAX_JITTER: u32 = 10;
    pub const DEFAULT_BATCH_SIZE: usize = 2;

    pub fn new(reference: SystemTime, window: Duration, step: Duration) -> Self {
        Self {
            reference,
            window,
            step,
            max_jitter: Self::DEFAULT_MAX_JITTER,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: u32) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Start (inclusive) of the generated window.
    pub fn window_start(&self) -> Option<SystemTime> {
        self.reference
            .checked_sub(self.window)
            .filter(|start| *start >= UNIX_EPOCH)
    }

    fn validate(&self) -> Result<ValidDispatchConfig, BoxError> {
        if self.window.is_zero() {
            return Err(BoxError::from("invalid dispatch config: window must be > 0"));
        }
        if self.step.is_zero() {
            return Err(BoxError::from("invalid dispatch config: step must be > 0"));
        }
        if self.max_jitter == 0 {
            return Err(BoxError::from(
                "invalid dispatch config: max jitter must be >= 1",
            ));
        }
        let batch_size = NonZeroUsize::new(self.batch_size)
            .context("invalid dispatch config: batch size must be >= 1")?;
        let start = self
            .window_start()
            .context("invalid dispatch config: window starts before the unix epoch")
            .with_context_debug_field("window", || self.window)?;

        Ok(ValidDispatchConfig {
            start,
            end: self.reference,
            step: self.step,
            max_jitter: self.max_jitter,
            batch_size,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct ValidDispatchConfig {
    start: SystemTime,
    end: SystemTime,
    step: Duration,
    max_jitter: u32,
    batch_size: NonZeroUsize,
}

/// How a single user task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    /// The whole timeline was submitted.
    Completed { batches: u64 },
    /// The permit source closed before the timeline was exhausted.
    Closed { batches: u64 },
    /// Shutdown was initiated before the timeline was exhausted.
    Cancelled { batches: u64 },
}

impl UserOutcome {
    pub fn batches(&self) -> u64 {
        match self {
            Self::Completed { batches }
            | Self::Closed { batches }
            | Self::Cancelled { batches } => *batches,
        }
    }
}

/// Aggregated outcome of [`dispatch_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub users: usize,
    pub completed: usize,
    pub stopped: usize,
    pub batches: u64,
}

impl DispatchReport {
    fn record(&mut self, outcome: UserOutcome) {
        self.users += 1;
        self.batches += outcome.batches();
        match outcome {
            UserOutcome::Completed { .. } => self.completed += 1,
            UserOutcome::Closed { .. } | UserOutcome::Cancelled { .. } => self.stopped += 1,
        }
    }
}

/// Spawn one task per user and wait until all of them finished.
pub async fn dispatch_all<P, C>(
    guard: ShutdownGuard,
    users: Vec<String>,
    cfg: DispatchConfig,
    submitter: Arc<Submitter<P, C>>,
) -> Result<DispatchReport, BoxError>
where
    P: PermitSource,
    C: Service<Request, Output = Response, Error = BoxError>,
{
    let cfg = cfg.validate()?;
    if users.is_empty() {
        return Err(BoxError::from("dispatch requires at least one user"));
    }
    if users.iter().any(String::is_empty) {
        return Err(BoxError::from("dispatch users cannot have an empty name"));
    }

    tracing::info!(
        users = users.len(),
        window.start = %humantime::format_rfc3339(cfg.start),
        window.end = %humantime::format_rfc3339(cfg.end),
        step = ?cfg.step,
        max_jitter = cfg.max_jitter,
        batch_size = cfg.batch_size.get(),
        "dispatch started",
    );

    let mut tasks = JoinSet::new();
    for user in users {
        let span = tracing::debug_span!("dispatch user", %user);
        tasks.spawn(
            dispatch_user(guard.clone(), user, cfg, submitter.clone(), rand::random())
                .instrument(span),
        );
    }

    let mut report = DispatchReport::default();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(outcome) => report.record(outcome),
            Err(err) => tracing::error!(error = %err, "dispatch user task failed"),
        }
    }

    tracing::info!(
        users = report.users,
        completed = report.completed,
        stopped = report.stopped,
        batches = report.batches,
        "dispatch finished",
    );
    Ok(report)
}

async fn dispatch_user<P, C>(
    guard: ShutdownGuard,
    user: String,
    cfg: ValidDispatchConfig,
    submitter: Arc<Submitter<P, C>>,
    seed: u64,
) -> UserOutcome
where
    P: PermitSource,
    C: Service<Request, Output = Response, Error = BoxError>,
{
    let timeline = Timeline::new(
        cfg.start,
        cfg.end,
        cfg.step,
        cfg.max_jitter,
        StdRng::seed_from_u64(seed),
    );
    let mut payload_rng = StdRng::seed_from_u64(seed.rotate_left(32));

    let events = timeline.map(|ts| Event::new(user.clone(), random_payload(&mut payload_rng), ts));

    let mut batches = 0;
    for batch in Batches::new(events, cfg.batch_size) {
        tokio::select! {
            _ = guard.cancelled() => {
                tracing::debug!(batches, "exit dispatch user: guard shutdown");
                return UserOutcome::Cancelled { batches };
            }
            result = submitter.submit(&batch) => {
                if let Err(LimiterClosed) = result {
                    tracing::debug!(batches, "exit dispatch user: permit source closed");
                    return UserOutcome::Closed { batches };
                }
            }
        }
        batches += 1;
    }

    tracing::debug!(batches, "dispatch user completed");
    UserOutcome::Completed { batches }
}
