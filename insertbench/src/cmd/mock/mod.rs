use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        BodyExtractExt as _, HeaderValue, Method, Request, Response, StatusCode,
        header::AUTHORIZATION,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::response::IntoResponse,
    },
    layer::TimeoutLayer,
    net::socket::Interface,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};

use clap::Args;
use insertbench_lib::{submit::Credential, utils::env::network_service_identifier};

#[derive(Debug, Clone, Args)]
/// run a local sink accepting the event batches of the `run` command
pub struct MockCommand {
    /// network interface to bind to
    #[arg(
        long,
        short = 'b',
        value_name = "INTERFACE",
        default_value = "127.0.0.1:9090"
    )]
    pub bind: Interface,

    /// bearer credential requests have to present
    #[arg(long, env = "API_SECRET", default_value = "shhhh", hide_env_values = true)]
    secret: Credential,

    /// fraction of accepted requests answered with a server error
    #[arg(long, value_name = "RATE", default_value_t = 0.)]
    error_rate: f64,

    /// artificial latency added to every request
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    latency: f64,
}

pub async fn exec(guard: ShutdownGuard, args: MockCommand) -> Result<(), BoxError> {
    let sink = Arc::new(MockSink::try_new(
        args.secret,
        args.error_rate,
        args.latency,
    )?);

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(network_service_identifier())),
    )
        .into_layer(sink.clone());

    let exec = Executor::graceful(guard);
    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));
    let tcp_svc = TimeoutLayer::new(Duration::from_secs(60)).into_layer(http_server);

    let tcp_listener = TcpListener::bind(args.bind.clone(), exec)
        .await
        .context("bind mock sink http server")
        .with_context_field("interface", || args.bind.clone())?;

    let sink_addr = tcp_listener
        .local_addr()
        .context("get bound address for mock sink http server")?;
    tracing::info!("mock sink http server bound to: {sink_addr}");

    tcp_listener.serve(tcp_svc).await;

    let totals = sink.totals();
    tracing::info!(
        accepted = totals.accepted,
        events = totals.events,
        failed = totals.failed,
        unauthorized = totals.unauthorized,
        rejected = totals.rejected,
        "mock sink stopped",
    );

    Ok(())
}

/// Stand-in for the API under test.
///
/// Accepts `POST /<target>/add` with a single event object
/// and `POST /<target>/list/add` with an array of events.
#[derive(Debug)]
struct MockSink {
    credential: Credential,
    error_rate: f64,
    latency: Duration,
    counters: SinkCounters,
}

#[derive(Debug, Default)]
struct SinkCounters {
    accepted: AtomicU64,
    events: AtomicU64,
    failed: AtomicU64,
    unauthorized: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SinkTotals {
    accepted: u64,
    events: u64,
    failed: u64,
    unauthorized: u64,
    rejected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Add,
    ListAdd,
}

impl Route {
    fn from_path(path: &str) -> Option<Self> {
        let mut segments = path.trim_start_matches('/').split('/');
        let target = segments.next().filter(|s| !s.is_empty())?;
        let route = match (segments.next(), segments.next(), segments.next()) {
            (Some("add"), None, None) => Self::Add,
            (Some("list"), Some("add"), None) => Self::ListAdd,
            _ => return None,
        };
        tracing::trace!(target_name = target, ?route, "matched sink route");
        Some(route)
    }
}

impl MockSink {
    fn try_new(credential: Credential, error_rate: f64, latency: f64) -> Result<Self, BoxError> {
        if !(0. ..=1.).contains(&error_rate) {
            return Err(BoxError::from("mock sink error rate must be within [0, 1]"));
        }
        let latency = Duration::try_from_secs_f64(latency)
            .context("invalid mock sink latency")
            .with_context_field("latency", || latency)?;

        Ok(Self {
            credential,
            error_rate,
            latency,
            counters: SinkCounters::default(),
        })
    }

    fn totals(&self) -> SinkTotals {
        SinkTotals {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            events: self.counters.events.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            unauthorized: self.counters.unauthorized.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    fn reject(&self, status: StatusCode) -> Response {
        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        status.into_response()
    }

    fn is_authorized(&self, req: &Request) -> bool {
        req.headers()
            .get(AUTHORIZATION)
            .is_some_and(|value| self.credential.matches(value))
    }
}

impl Service<Request> for MockSink {
    type Output = Response;
    type Error = Infallible;

    async fn serve(&self, req: Request) -> Result<Self::Output, Self::Error> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let Some(route) = Route::from_path(req.uri().path()) else {
            return Ok(self.reject(StatusCode::NOT_FOUND));
        };
        if req.method() != Method::POST {
            return Ok(self.reject(StatusCode::METHOD_NOT_ALLOWED));
        }
        if !self.is_authorized(&req) {
            self.counters.unauthorized.fetch_add(1, Ordering::Relaxed);
            return Ok(StatusCode::UNAUTHORIZED.into_response());
        }

        let events = match req.try_into_json::<serde_json::Value>().await {
            Ok(serde_json::Value::Object(_)) if route == Route::Add => 1,
            Ok(serde_json::Value::Array(events)) if route == Route::ListAdd => events.len(),
            Ok(_) => return Ok(self.reject(StatusCode::BAD_REQUEST)),
            Err(err) => {
                tracing::debug!("failed to decode event payload: {err}");
                return Ok(self.reject(StatusCode::BAD_REQUEST));
            }
        };

        if self.error_rate > 0. && rand::random::<f64>() < self.error_rate {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return Ok(StatusCode::INTERNAL_SERVER_ERROR.into_response());
        }

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        self.counters
            .events
            .fetch_add(events as u64, Ordering::Relaxed);
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}
