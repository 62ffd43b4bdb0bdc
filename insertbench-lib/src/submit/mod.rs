//! Delivery of batches to the comparison targets.
//!
//! Every batch is sent to every [`Target`], one request per target,
//! and every request first consumes a permit. Failures are logged
//! and counted, never retried.

use std::sync::atomic::{AtomicU64, Ordering};

use rama::{
    Service,
    bytes::Bytes,
    error::{BoxError, ErrorContext as _},
    http::{
        Body, HeaderValue, Method, Request, Response, StatusCode, Uri,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    telemetry::tracing,
};
use serde::Serialize;

use crate::{
    dispatch::Batch,
    limiter::{LimiterClosed, PermitSource},
};

mod client;
mod target;


pub use self::{
    client::{WebClientConfig, new_web_client},
    target::{Credential, Target},
};

/// Submits batches to all targets, paced by a [`PermitSource`].
pub struct Submitter<P, C> {
    permits: P,
    client: C,
    targets: Vec<Target>,
    authorization: HeaderValue,
    stats: SubmitStats,
}

impl<P, C> std::fmt::Debug for Submitter<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("targets", &self.targets)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl<P, C> Submitter<P, C>
where
    P: PermitSource,
    C: Service<Request, Output = Response, Error = BoxError>,
{
    pub fn try_new(
        permits: P,
        client: C,
        targets: Vec<Target>,
        credential: &Credential,
    ) -> Result<Self, BoxError> {
        if targets.is_empty() {
            return Err(BoxError::from("submitter requires at least one target"));
        }
        let authorization = credential
            .bearer_header_value()
            .context("create submitter authorization header")?;

        Ok(Self {
            permits,
            client,
            targets,
            authorization,
            stats: SubmitStats::default(),
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn stats(&self) -> SubmitSummary {
        self.stats.snapshot()
    }

    /// Send `batch` to every target, in declared order.
    ///
    /// Only fails when the permit source is closed, in which case
    /// the remaining targets are skipped.
    pub async fn submit(&self, batch: &Batch) -> Result<(), LimiterClosed> {
        let body = match batch.encode() {
            Ok(body) => Bytes::from(body),
            Err(err) => {
                self.stats.encode_fail.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %err,
                    events = batch.len(),
                    "failed to encode batch: dropped",
                );
                return Ok(());
            }
        };

        for target in &self.targets {
            let uri = if batch.is_single() {
                target.add_uri()
            } else {
                target.list_add_uri()
            };

            let _permit = self.permits.acquire().await?;
            self.send(target, uri, body.clone()).await;
        }

        Ok(())
    }

    async fn send(&self, target: &Target, uri: &Uri, body: Bytes) {
        let req = match self.new_request(uri, body) {
            Ok(req) => req,
            Err(err) => {
                self.stats.transport_fail.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    target_name = target.name(),
                    error = %err,
                    "failed to create request",
                );
                return;
            }
        };

        match self.client.serve(req).await {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => {
                self.stats.ok.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(target_name = target.name(), "batch inserted");
            }
            Ok(resp) => {
                self.stats.http_fail.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    target_name = target.name(),
                    status = %resp.status(),
                    %uri,
                    "unexpected response status",
                );
            }
            Err(err) => {
                self.stats.transport_fail.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    target_name = target.name(),
                    error = %err,
                    %uri,
                    "failed to send batch",
                );
            }
        }
    }

    fn new_request(&self, uri: &Uri, body: Bytes) -> Result<Request, BoxError> {
        Request::builder()
            .method(Method::POST)
            .uri(uri.clone())
            .header(AUTHORIZATION, self.authorization.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::from(body))
            .context("build submit request")
    }
}

#[derive(Debug, Default)]
struct SubmitStats {
    ok: AtomicU64,
    http_fail: AtomicU64,
    transport_fail: AtomicU64,
    encode_fail: AtomicU64,
}

impl SubmitStats {
    fn snapshot(&self) -> SubmitSummary {
        SubmitSummary {
            ok: self.ok.load(Ordering::Relaxed),
            http_fail: self.http_fail.load(Ordering::Relaxed),
            transport_fail: self.transport_fail.load(Ordering::Relaxed),
            encode_fail: self.encode_fail.load(Ordering::Relaxed),
        }
    }
}

/// Point in time copy of the submit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubmitSummary {
    /// Requests answered with `204 No Content`.
    pub ok: u64,
    /// Requests answered with any other status.
    pub http_fail: u64,
    /// Requests that did not produce a response.
    pub transport_fail: u64,
    /// Batches dropped because they could not be encoded.
    pub encode_fail: u64,
}

impl SubmitSummary {
    pub fn requests(&self) -> u64 {
        self.ok + self.http_fail + self.transport_fail
    }
}
