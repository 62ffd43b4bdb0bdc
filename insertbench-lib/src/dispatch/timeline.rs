use std::time::{Duration, SystemTime};

use rand::{Rng, RngExt as _};

/// Lazy, finite and strictly increasing sequence of timestamps
/// within `[start, end)`.
///
/// The first timestamp is `start`; every next one advances by
/// `step * jitter`, with jitter drawn uniformly from `1..=max_jitter`.
#[derive(Debug)]
pub struct Timeline<R> {
    next: Option<SystemTime>,
    end: SystemTime,
    step: Duration,
    max_jitter: u32,
    rng: R,
}

impl<R: Rng> Timeline<R> {
    /// A zero `max_jitter` is treated as one (no jitter).
    pub fn new(start: SystemTime, end: SystemTime, step: Duration, max_jitter: u32, rng: R) -> Self {
        Self {
            // a zero step would never advance
            next: (!step.is_zero()).then_some(start),
            end,
            step,
            max_jitter: max_jitter.max(1),
            rng,
        }
    }
}

impl<R: Rng> Iterator for Timeline<R> {
    type Item = SystemTime;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take().filter(|ts| *ts < self.end)?;

        let jitter = self.rng.random_range(1..=self.max_jitter);
        self.next = self
            .step
            .checked_mul(jitter)
            .and_then(|advance| current.checked_add(advance));

        Some(current)
    }
}
