use std::time::Duration;

/// Load generation configuration.
/// Every property left undefined falls back to the scenario value.
#[derive(Debug, Clone, clap::Args, Default)]
pub struct LoadConfig {
    /// Aggregate requests per second, over all users and targets.
    #[arg(long, value_name = "N")]
    pub target_rps: Option<u32>,

    /// Maximum number of buffered permits (burst size).
    /// Defaults to the permits issued per millisecond timer wakeup.
    #[arg(long, value_name = "N")]
    pub capacity: Option<u32>,

    /// Report progress every time this many permits were used.
    #[arg(long, value_name = "N")]
    pub log_every: Option<u64>,

    /// Maximum number of events submitted in a single request.
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Upper bound of the random amount of users.
    /// Not used when users are given explicitly.
    #[arg(long, value_name = "N")]
    pub max_users: Option<usize>,

    /// Length of the generated time window, ending now (e.g. `10h`).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub window: Option<Duration>,

    /// Base distance between two events of a user (e.g. `10ms`).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub step: Option<Duration>,

    /// Upper bound (inclusive) of the random step multiplier.
    #[arg(long, value_name = "N")]
    pub max_jitter: Option<u32>,
}
