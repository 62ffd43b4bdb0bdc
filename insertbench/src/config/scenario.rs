use std::time::Duration;

use super::LoadConfig;

/// High level benchmark scenarios.
/// Each scenario is a preset of the load generation behavior.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default)]
pub enum Scenario {
    /// Steady load over a long history.
    /// Used to compare the targets under realistic conditions.
    #[default]
    Baseline,

    /// Few users, short history, low rate.
    /// Used to check a deployment end-to-end.
    Smoke,

    /// Many users submitting large batches at a high rate.
    /// Used to find the saturation point of the targets.
    Stress,
}

impl Scenario {
    /// Construct the concrete load configuration
    /// associated with this scenario.
    pub fn load_config(self) -> LoadConfig {
        match self {
            Scenario::Baseline => LoadConfig {
                target_rps: Some(60),
                capacity: None,
                log_every: Some(2000),
                batch_size: Some(2),
                max_users: Some(100),
                window: Some(Duration::from_secs(10 * 60 * 60)),
                step: Some(Duration::from_millis(10)),
                max_jitter: Some(10),
            },

            Scenario::Smoke => LoadConfig {
                target_rps: Some(10),
                capacity: None,
                log_every: Some(100),
                batch_size: Some(2),
                max_users: Some(5),
                window: Some(Duration::from_secs(60)),
                step: Some(Duration::from_millis(100)),
                max_jitter: Some(10),
            },

            // Bursts of a full second are allowed,
            // the targets should absorb them.
            Scenario::Stress => LoadConfig {
                target_rps: Some(2000),
                capacity: Some(2000),
                log_every: Some(20_000),
                batch_size: Some(10),
                max_users: Some(1000),
                window: Some(Duration::from_secs(10 * 60 * 60)),
                step: Some(Duration::from_millis(1)),
                max_jitter: Some(10),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum as _;

    #[test]
    fn test_scenarios_are_fully_defined() {
        for scenario in Scenario::value_variants() {
            let cfg = scenario.load_config();
            assert!(cfg.target_rps.is_some_and(|v| v > 0), "{scenario:?}");
            assert!(cfg.log_every.is_some_and(|v| v > 0), "{scenario:?}");
            assert!(cfg.batch_size.is_some_and(|v| v > 0), "{scenario:?}");
            assert!(cfg.max_users.is_some_and(|v| v > 0), "{scenario:?}");
            assert!(cfg.window.is_some_and(|v| !v.is_zero()), "{scenario:?}");
            assert!(cfg.step.is_some_and(|v| !v.is_zero()), "{scenario:?}");
            assert!(cfg.max_jitter.is_some_and(|v| v > 0), "{scenario:?}");
        }
    }
}
