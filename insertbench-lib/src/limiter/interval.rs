use std::time::Duration;

use super::LimiterConfigError;

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Granularity of the tokio timer driving the refill loop.
///
/// Ticks of a finer interval are delivered in bursts, once per timer wakeup.
pub const TIMER_RESOLUTION: Duration = Duration::from_millis(1);

/// Refill intervals the solver can pick from, coarsest first.
const CANDIDATE_INTERVALS: [Duration; 7] = [
    ONE_SECOND,
    Duration::from_millis(100),
    Duration::from_millis(10),
    Duration::from_millis(1),
    Duration::from_micros(100),
    Duration::from_micros(10),
    Duration::from_micros(1),
];

/// How often a limiter refills and by how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillSchedule {
    interval: Duration,
    tokens_per_interval: u32,
}

impl RefillSchedule {
    /// Create a schedule directly, bypassing the solver.
    pub fn new(interval: Duration, tokens_per_interval: u32) -> Result<Self, LimiterConfigError> {
        if interval.is_zero() || tokens_per_interval == 0 {
            return Err(LimiterConfigError::EmptySchedule);
        }
        Ok(Self {
            interval,
            tokens_per_interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tokens_per_interval(&self) -> u32 {
        self.tokens_per_interval
    }

    /// Permits per second this schedule issues when nothing is skipped.
    pub fn rate_per_second(&self) -> f64 {
        self.tokens_per_interval as f64 / self.interval.as_secs_f64()
    }

    /// Permits issued per [`TIMER_RESOLUTION`], but never less than one tick worth.
    ///
    /// A store smaller than this loses the permits of the ticks
    /// that fire back to back within a single timer wakeup.
    pub fn tokens_per_wakeup(&self) -> u32 {
        let ticks = (TIMER_RESOLUTION.as_nanos() / self.interval.as_nanos()).max(1);
        let ticks = u32::try_from(ticks).unwrap_or(u32::MAX);
        self.tokens_per_interval.saturating_mul(ticks)
    }
}

/// Pick a refill interval and per-tick token count for `target_rate` permits per second.
///
/// Candidates are walked from 1s down to 1µs. As long as a candidate divides the
/// rate without remainder it replaces the previous pick; the walk stops at the
/// first candidate that would leave a remainder. This gives the smoothest
/// (finest) cadence that still reproduces the rate exactly, without sliding
/// into sub-token granularity. One second is always exact for an integer rate.
///
/// ```
/// use std::time::Duration;
/// use insertbench_lib::limiter::interval::solve;
///
/// let schedule = solve(60).unwrap();
/// assert_eq!(schedule.interval(), Duration::from_millis(100));
/// assert_eq!(schedule.tokens_per_interval(), 6);
/// ```
pub fn solve(target_rate: u32) -> Result<RefillSchedule, LimiterConfigError> {
    if target_rate < 1 {
        return Err(LimiterConfigError::ZeroTargetRate);
    }

    let mut schedule = RefillSchedule {
        interval: ONE_SECOND,
        tokens_per_interval: target_rate,
    };

    for interval in CANDIDATE_INTERVALS {
        let ticks_per_second = (ONE_SECOND.as_nanos() / interval.as_nanos()) as u32;
        let tokens = target_rate / ticks_per_second;
        if target_rate - tokens * ticks_per_second >= 1 {
            break;
        }
        schedule = RefillSchedule {
            interval,
            tokens_per_interval: tokens,
        };
    }

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_solves_to(rate: u32, interval: Duration, tokens: u32) {
        let schedule = solve(rate).unwrap();
        assert_eq!(
            (schedule.interval(), schedule.tokens_per_interval()),
            (interval, tokens),
            "rate = {rate}",
        );
    }

    #[test]
    fn test_solve_sixty() {
        assert_solves_to(60, Duration::from_millis(100), 6);
    }

    #[test]
    fn test_solve_known_rates() {
        assert_solves_to(1, Duration::from_secs(1), 1);
        assert_solves_to(7, Duration::from_secs(1), 7);
        assert_solves_to(250, Duration::from_millis(100), 25);
        assert_solves_to(1_000, Duration::from_millis(1), 1);
        assert_solves_to(2_500, Duration::from_millis(10), 25);
        assert_solves_to(2_000_000, Duration::from_micros(1), 2);
    }

    #[test]
    fn test_solve_zero_rate_is_invalid() {
        assert_eq!(solve(0), Err(LimiterConfigError::ZeroTargetRate));
    }

    #[test]
    fn test_solve_is_exact_and_stops_at_first_remainder() {
        for rate in 1..=20_000 {
            let schedule = solve(rate).unwrap();
            let ticks = (ONE_SECOND.as_nanos() / schedule.interval().as_nanos()) as u32;
            assert_eq!(schedule.tokens_per_interval() * ticks, rate, "rate = {rate}");

            // the next finer candidate, if any, must not be exact
            let idx = CANDIDATE_INTERVALS
                .iter()
                .position(|c| *c == schedule.interval())
                .unwrap();
            if let Some(finer) = CANDIDATE_INTERVALS.get(idx + 1) {
                let finer_ticks = (ONE_SECOND.as_nanos() / finer.as_nanos()) as u32;
                assert_ne!(rate % finer_ticks, 0, "rate = {rate}");
            }
        }
    }

    #[test]
    fn test_schedule_rate_per_second() {
        let schedule = solve(60).unwrap();
        assert!((schedule.rate_per_second() - 60.0).abs() < f64::EPSILON * 100.0);
    }

    #[test]
    fn test_tokens_per_wakeup() {
        // intervals at or above the timer resolution fire one tick per wakeup
        assert_eq!(solve(60).unwrap().tokens_per_wakeup(), 6);
        assert_eq!(solve(2_000).unwrap().tokens_per_wakeup(), 2);

        assert_eq!(solve(20_000).unwrap().tokens_per_wakeup(), 20);
        assert_eq!(solve(200_000).unwrap().tokens_per_wakeup(), 200);
        assert_eq!(solve(2_000_000).unwrap().tokens_per_wakeup(), 2_000);

        let schedule = RefillSchedule::new(Duration::from_nanos(1), u32::MAX).unwrap();
        assert_eq!(schedule.tokens_per_wakeup(), u32::MAX);
    }

    #[test]
    fn test_schedule_new_rejects_empty() {
        assert_eq!(
            RefillSchedule::new(Duration::ZERO, 1),
            Err(LimiterConfigError::EmptySchedule)
        );
        assert_eq!(
            RefillSchedule::new(Duration::from_millis(1), 0),
            Err(LimiterConfigError::EmptySchedule)
        );
        assert!(RefillSchedule::new(Duration::from_millis(100), 20).is_ok());
    }
}
