use std::time::Duration;

use rama::{
    Layer as _, Service as _,
    error::{BoxError, ErrorContext as _},
    http::{
        HeaderValue, Request, Response,
        client::{EasyHttpWebClient, ProxyConnectorLayer, proxy::layer::HttpProxyConnectorLayer},
        layer::{
            map_request_body::MapRequestBodyLayer, map_response_body::MapResponseBodyLayer,
            required_header::AddRequiredRequestHeadersLayer,
        },
    },
    layer::{AddInputExtensionLayer, TimeoutLayer},
    net::{
        Protocol,
        address::{ProxyAddress, SocketAddress},
    },
    proxy::socks5::Socks5ProxyConnectorLayer,
    rt::Executor,
    service::BoxService,
};

use crate::utils::env::network_service_identifier;

#[derive(Debug, Clone)]
pub struct WebClientConfig {
    /// Upper bound for a single request, connection setup included.
    pub timeout: Duration,
    /// Send all requests through this HTTP proxy.
    pub proxy: Option<SocketAddress>,
}

impl Default for WebClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
        }
    }
}

/// Create the pooled web client used to submit batches.
///
/// Failed requests are never retried: every request consumed a permit
/// and a retry would skew the configured throughput.
pub fn new_web_client(
    exec: Executor,
    cfg: WebClientConfig,
) -> Result<BoxService<Request, Response, BoxError>, BoxError> {
    let inner = EasyHttpWebClient::connector_builder()
        .with_default_transport_connector()
        .without_tls_proxy_support()
        .with_custom_proxy_connector(ProxyConnectorLayer::optional(
            Socks5ProxyConnectorLayer::required(),
            HttpProxyConnectorLayer::required(),
        ))
        .with_tls_support_using_boringssl(None)
        .with_default_http_connector(exec)
        .try_with_default_connection_pool()
        .context("create connection pool for web client")?
        .build_client();

    let client = (
        MapResponseBodyLayer::new_boxed_streaming_body(),
        TimeoutLayer::new(cfg.timeout),
        AddRequiredRequestHeadersLayer::new()
            .with_user_agent_header_value(HeaderValue::from_static(network_service_identifier())),
        MapRequestBodyLayer::new_boxed_streaming_body(),
    )
        .into_layer(inner);

    Ok(match cfg.proxy {
        Some(address) => AddInputExtensionLayer::new(ProxyAddress {
            protocol: Some(Protocol::HTTP),
            address: address.into(),
            credential: None,
        })
        .into_layer(client)
        .boxed(),
        None => client.boxed(),
    })
}
