//! Error types for pdns-exporter.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading configuration or probing targets.
///
/// Probe errors never reach the scrape response: they are converted into
/// unavailable probe results at the probe boundary.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration source could not be read or deserialized
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Outbound TLS material could not be loaded
    #[error("TLS material error: {0}")]
    Tls(String),

    /// No response within the transport deadline
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Target address did not resolve to any socket address
    #[error("address did not resolve: {0}")]
    Unresolvable(String),
}
