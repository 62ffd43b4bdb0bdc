//! Permit based throughput control.
//!
//! A [`RateLimiter`] keeps a bounded store of [`Permit`]s topped up on a
//! fixed cadence, computed by [`interval::solve`] from the requested rate.
//! A [`LoggingProxy`] can be stacked on top of any [`PermitSource`]
//! to report throughput without affecting it.
//!
//! Both run a background loop bound to a [`rama::graceful::ShutdownGuard`]:
//! once shutdown is initiated the loops stop, the stores close and
//! [`PermitSource::acquire`] resolves to [`LimiterClosed`] after the
//! remaining permits are drained.

use std::fmt;

pub mod interval;

mod proxy;
mod rate;
mod store;

pub use self::{
    interval::RefillSchedule,
    proxy::{LoggingProxy, LoggingProxyConfig},
    rate::{RateLimiter, RateLimiterConfig},
};

/// A single unit of allowed throughput.
///
/// Permits can only be created by the limiter machinery of this crate,
/// cannot be cloned and are consumed by dropping them.
#[derive(Debug)]
#[must_use = "a permit that is not used is wasted throughput"]
pub struct Permit {
    _priv: (),
}

impl Permit {
    pub(crate) const fn new() -> Self {
        Self { _priv: () }
    }
}

/// Something that hands out [`Permit`]s to many concurrent consumers.
pub trait PermitSource: Send + Sync + 'static {
    /// Wait until a permit is available.
    ///
    /// Each permit is delivered to exactly one caller.
    /// No ordering between concurrent waiters is guaranteed.
    fn acquire(&self) -> impl Future<Output = Result<Permit, LimiterClosed>> + Send + '_;

    /// Take a permit if one is available right now.
    fn try_acquire(&self) -> Option<Permit>;
}

/// The permit source stopped and has no buffered permits left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterClosed;

impl fmt::Display for LimiterClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permit source closed")
    }
}

impl std::error::Error for LimiterClosed {}

/// Invalid limiter or proxy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterConfigError {
    /// The target rate must be at least one permit per second.
    ZeroTargetRate,
    /// The permit store must be able to hold at least one permit.
    ZeroCapacity,
    /// A refill schedule must issue at least one permit per tick,
    /// on a non-zero interval.
    EmptySchedule,
    /// The logging proxy needs a threshold of at least one permit.
    ZeroLogThreshold,
    /// The logging proxy needs room for at least one forwarded permit.
    ZeroProxyBuffer,
}

impl fmt::Display for LimiterConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimiterConfigError::ZeroTargetRate => {
                write!(f, "invalid limiter config: target rate must be >= 1/s")
            }
            LimiterConfigError::ZeroCapacity => {
                write!(f, "invalid limiter config: capacity must be >= 1")
            }
            LimiterConfigError::EmptySchedule => write!(
                f,
                "invalid limiter config: refill schedule needs a non-zero interval and token count"
            ),
            LimiterConfigError::ZeroLogThreshold => {
                write!(f, "invalid logging proxy config: threshold must be >= 1")
            }
            LimiterConfigError::ZeroProxyBuffer => {
                write!(f, "invalid logging proxy config: buffer must be >= 1")
            }
        }
    }
}

impl std::error::Error for LimiterConfigError {}
