use std::{sync::Arc, time::{Duration, SystemTime}};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::Uri,
    net::address::SocketAddress,
    rt::Executor,
    telemetry::tracing,
};

use clap::Args;
use insertbench_lib::{
    data::random_users,
    dispatch::{DispatchConfig, dispatch_all},
    limiter::{LoggingProxy, LoggingProxyConfig, RateLimiter, RateLimiterConfig},
    submit::{Credential, Submitter, Target, WebClientConfig, new_web_client},
};
use tokio::time::Instant;

use crate::config::{LoadConfig, Scenario};

const DEFAULT_TARGET_RPS: u32 = 60;
const DEFAULT_LOG_EVERY: u64 = 2000;
const DEFAULT_MAX_USERS: usize = 100;
const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60 * 60);
const DEFAULT_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Args)]
/// generate rate limited insert load against the comparison targets
pub struct RunCommand {
    /// base url of the API under test
    #[arg(
        long,
        env = "API_BASE_URL",
        value_name = "URL",
        default_value = "http://localhost:9090"
    )]
    base_url: Uri,

    /// bearer credential for the API under test
    #[arg(long, env = "API_SECRET", default_value = "shhhh", hide_env_values = true)]
    secret: Credential,

    /// comparison targets every batch is submitted to, in this order
    #[arg(
        long = "target",
        value_name = "NAME",
        value_delimiter = ',',
        default_value = "noindex,tsv,createatuser"
    )]
    targets: Vec<String>,

    /// users to generate events for,
    /// a random set of users is generated if none are defined
    #[arg(long = "user", value_name = "NAME", value_delimiter = ',')]
    users: Vec<String>,

    /// send all requests via the HTTP proxy at this address
    #[arg(long, value_name = "ADDRESS")]
    proxy: Option<SocketAddress>,

    /// timeout of a single request
    #[arg(long, value_name = "SECONDS", default_value_t = 30.)]
    timeout: f64,

    #[clap(flatten)]
    config: Option<LoadConfig>,

    #[arg(long)]
    /// Scenario to run,
    /// manually defined parameters overwrite scenario parameters.
    scenario: Option<Scenario>,
}

pub async fn exec(guard: ShutdownGuard, args: RunCommand) -> Result<(), BoxError> {
    let merged_cfg = merge_load_cfg(args.scenario, args.config);

    let target_rps = merged_cfg.target_rps.unwrap_or(DEFAULT_TARGET_RPS);
    let log_every = merged_cfg.log_every.unwrap_or(DEFAULT_LOG_EVERY);
    let max_users = merged_cfg.max_users.unwrap_or(DEFAULT_MAX_USERS);
    let dispatch_cfg = DispatchConfig::new(
        SystemTime::now(),
        merged_cfg.window.unwrap_or(DEFAULT_WINDOW),
        merged_cfg.step.unwrap_or(DEFAULT_STEP),
    )
    .with_max_jitter(
        merged_cfg
            .max_jitter
            .unwrap_or(DispatchConfig::DEFAULT_MAX_JITTER),
    )
    .with_batch_size(
        merged_cfg
            .batch_size
            .unwrap_or(DispatchConfig::DEFAULT_BATCH_SIZE),
    );

    let limiter = RateLimiter::try_new(
        guard.clone(),
        RateLimiterConfig {
            target_rate: target_rps,
            capacity: merged_cfg.capacity,
        },
    )
    .context("create rate limiter")?;

    let permits = LoggingProxy::try_new(guard.clone(), limiter, LoggingProxyConfig::new(log_every))
        .context("create logging proxy")?;

    let client = new_web_client(
        Executor::graceful(guard.clone()),
        WebClientConfig {
            timeout: Duration::try_from_secs_f64(args.timeout)
                .context("invalid request timeout")
                .with_context_field("timeout", || args.timeout)?,
            proxy: args.proxy,
        },
    )
    .context("create web client")?;

    let targets = Target::try_new_all(&args.base_url, &args.targets)
        .context("create targets")
        .with_context_field("base_url", || args.base_url.clone())?;

    let submitter = Arc::new(
        Submitter::try_new(permits, client, targets, &args.secret).context("create submitter")?,
    );

    let users = if args.users.is_empty() {
        random_users(&mut rand::rng(), max_users)
    } else {
        args.users
    };

    tracing::info!(
        base_url = %args.base_url,
        targets = ?submitter.targets().iter().map(Target::name).collect::<Vec<_>>(),
        users = users.len(),
        %target_rps,
        %log_every,
        "run config parameters ready",
    );

    let start = Instant::now();
    let report = dispatch_all(guard, users, dispatch_cfg, submitter.clone())
        .await
        .context("dispatch events")?;

    let elapsed = start.elapsed();
    let summary = submitter.stats();
    let requests = summary.requests();
    tracing::info!(
        users = report.users,
        stopped = report.stopped,
        batches = report.batches,
        requests,
        ok = summary.ok,
        http_fail = summary.http_fail,
        transport_fail = summary.transport_fail,
        encode_fail = summary.encode_fail,
        elapsed = ?elapsed,
        rps = requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        "run finished",
    );

    Ok(())
}

fn merge_load_cfg(scenario: Option<Scenario>, config: Option<LoadConfig>) -> LoadConfig {
    let scenario_cfg = scenario
        .map(|s| {
            tracing::info!("use scenario to define base config: {s:?}");
            s.load_config()
        })
        .unwrap_or_else(|| {
            tracing::info!("no scenario defined, use default as base config");
            Default::default()
        });

    let overwrite_cfg = config.unwrap_or_default();

    macro_rules! merge_config {
        ($scenario:ident, $overwrite:ident, {$($property:ident),+ $(,)?}) => {
            LoadConfig {
                $(
                    $property: if let Some(value) = $overwrite.$property {
                        tracing::info!("property '{}': use overwrite: {value:?}", stringify!($property));
                        Some(value)
                    } else if let Some(value) = $scenario.$property {
                        tracing::info!("property '{}': use scenario: {value:?}", stringify!($property));
                        Some(value)
                    } else {
                        tracing::info!("property '{}': undefined", stringify!($property));
                        None
                    },
                )+
            }
        };
    }

    merge_config!(
        scenario_cfg, overwrite_cfg,
        {
            target_rps,
            capacity,
            log_every,
            batch_size,
            max_users,
            window,
            step,
            max_jitter,
        }
    )
}
