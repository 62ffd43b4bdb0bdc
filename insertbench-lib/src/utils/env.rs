pub const fn project_name() -> &'static str {
    "insertbench"
}

/// Identifier used as `User-Agent` for outbound requests
/// and as `Server` header by the mock sink.
pub const fn network_service_identifier() -> &'static str {
    concat!("insertbench/", env!("CARGO_PKG_VERSION"))
}
