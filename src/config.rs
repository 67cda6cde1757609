//! Configuration types for pdns-exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ExporterError;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "PDNS_EXPORTER";

/// Path of the liveness endpoint, reserved next to the metrics path.
pub const HEALTH_PATH: &str = "/healthz";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scrape endpoint configuration.
    #[serde(default)]
    pub exporter: ExporterConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Probe timing configuration.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Outbound mutual-TLS material for balancer API probes.
    #[serde(default)]
    pub probe_tls: ProbeTlsConfig,

    /// Authority mega-clusters to check on every scrape.
    #[serde(default)]
    pub mega_clusters: Vec<MegaClusterConfig>,

    /// Upstream recursive resolvers to check on every scrape.
    #[serde(default)]
    pub recursors: Vec<RecursorConfig>,
}

/// Scrape endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Address for the metrics HTTP server to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Path the metrics are served under.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9100))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "pdns_exporter=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format of the log lines.
    #[serde(default)]
    pub log_format: LogFormat,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            opentelemetry: None,
        }
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "pdns-exporter".to_string()
}

/// Probe timing configuration. All values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Transport deadline of a single DNS exchange.
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Total deadline of a single balancer API request.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Wall-clock bound for collecting one simple cluster's probe results.
    #[serde(default = "default_cluster_deadline_ms")]
    pub cluster_deadline_ms: u64,

    /// Wall-clock bound for collecting one recursor's probe result.
    #[serde(default = "default_recursor_deadline_ms")]
    pub recursor_deadline_ms: u64,
}

impl ProbeConfig {
    /// Transport deadline of a single DNS exchange.
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    /// Total deadline of a single balancer API request.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Aggregate deadline of one simple cluster.
    pub fn cluster_deadline(&self) -> Duration {
        Duration::from_millis(self.cluster_deadline_ms)
    }

    /// Aggregate deadline of one recursor.
    pub fn recursor_deadline(&self) -> Duration {
        Duration::from_millis(self.recursor_deadline_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            dns_timeout_ms: default_dns_timeout_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            cluster_deadline_ms: default_cluster_deadline_ms(),
            recursor_deadline_ms: default_recursor_deadline_ms(),
        }
    }
}

fn default_dns_timeout_ms() -> u64 {
    300
}

fn default_http_timeout_ms() -> u64 {
    1000
}

fn default_cluster_deadline_ms() -> u64 {
    500
}

fn default_recursor_deadline_ms() -> u64 {
    500
}

/// Outbound mutual-TLS material used when probing balancer APIs.
///
/// When enabled, the balancer API is requested over HTTPS and the
/// certificate doubles as the trusted root for the balancer's server
/// certificate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeTlsConfig {
    /// Use HTTPS with a client certificate.
    #[serde(default)]
    pub enabled: bool,

    /// PEM certificate path.
    #[serde(default)]
    pub cert: Option<PathBuf>,

    /// PEM private key path.
    #[serde(default)]
    pub key: Option<PathBuf>,
}

/// A named group of simple clusters checked as one authority unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MegaClusterConfig {
    /// Mega-cluster identity, used as the `cluster` metric label.
    pub id: String,

    /// Member simple clusters, in configuration order.
    #[serde(default)]
    pub simple_clusters: Vec<SimpleClusterConfig>,
}

/// One authority deployment unit: master, slave and balancer API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleClusterConfig {
    /// Simple cluster identity.
    pub id: String,

    /// Master DNS node address (IP or hostname).
    pub master: String,

    /// Slave DNS node address (IP or hostname).
    pub slave: String,

    /// Balancer API address (IP or hostname).
    pub balancer: String,

    /// DNS port of master and slave.
    pub dns_port: u16,

    /// HTTP port of the balancer API.
    pub http_port: u16,

    /// Record name queried on master and slave.
    pub record: String,

    /// Credential sent as `X-API-Key`.
    pub api_token: String,

    /// Operator-set maintenance flag.
    #[serde(default)]
    pub maintenance: bool,
}

/// An upstream recursive resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecursorConfig {
    /// Recursor identity, used as the `recursor` metric label.
    pub id: String,

    /// Resolver address (IP or hostname).
    pub address: String,

    /// Record name to resolve.
    pub record: String,

    /// DNS port of the resolver.
    pub dns_port: u16,
}

impl Config {
    /// Load configuration from a file (TOML or JSON by extension) with
    /// `PDNS_EXPORTER__*` environment overrides, then validate it.
    pub fn load(path: &Path) -> Result<Self, ExporterError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_settings(settings)
    }

    /// Parse and validate configuration from an in-memory TOML document.
    pub fn from_toml_str(document: &str) -> Result<Self, ExporterError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from_str(
                document,
                ::config::FileFormat::Toml,
            ))
            .build()?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: ::config::Config) -> Result<Self, ExporterError> {
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields, port ranges, id uniqueness and TLS material.
    pub fn validate(&self) -> Result<(), ExporterError> {
        if !self.exporter.metrics_path.starts_with('/') {
            return Err(invalid(format!(
                "exporter.metrics_path must start with '/', got {:?}",
                self.exporter.metrics_path
            )));
        }
        if self.exporter.metrics_path == HEALTH_PATH {
            return Err(invalid(format!(
                "exporter.metrics_path must not be {HEALTH_PATH}"
            )));
        }

        let probe = &self.probe;
        for (name, value) in [
            ("dns_timeout_ms", probe.dns_timeout_ms),
            ("http_timeout_ms", probe.http_timeout_ms),
            ("cluster_deadline_ms", probe.cluster_deadline_ms),
            ("recursor_deadline_ms", probe.recursor_deadline_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("probe.{name} must be greater than zero")));
            }
        }

        if self.probe_tls.enabled && (self.probe_tls.cert.is_none() || self.probe_tls.key.is_none())
        {
            return Err(invalid(
                "probe_tls.cert and probe_tls.key are required when probe_tls.enabled",
            ));
        }

        let mut mega_ids = HashSet::new();
        for mega in &self.mega_clusters {
            require("mega_clusters.id", &mega.id)?;
            if !mega_ids.insert(mega.id.as_str()) {
                return Err(invalid(format!("duplicate mega cluster id {:?}", mega.id)));
            }

            let mut simple_ids = HashSet::new();
            for simple in &mega.simple_clusters {
                let scope = format!("mega_clusters[{}].simple_clusters", mega.id);
                require(&format!("{scope}.id"), &simple.id)?;
                require(&format!("{scope}[{}].master", simple.id), &simple.master)?;
                require(&format!("{scope}[{}].slave", simple.id), &simple.slave)?;
                require(&format!("{scope}[{}].balancer", simple.id), &simple.balancer)?;
                require(&format!("{scope}[{}].record", simple.id), &simple.record)?;
                require(&format!("{scope}[{}].api_token", simple.id), &simple.api_token)?;
                require_port(&format!("{scope}[{}].dns_port", simple.id), simple.dns_port)?;
                require_port(&format!("{scope}[{}].http_port", simple.id), simple.http_port)?;
                if !simple_ids.insert(simple.id.as_str()) {
                    return Err(invalid(format!(
                        "duplicate simple cluster id {:?} in mega cluster {:?}",
                        simple.id, mega.id
                    )));
                }
            }
        }

        let mut recursor_ids = HashSet::new();
        for recursor in &self.recursors {
            require("recursors.id", &recursor.id)?;
            require(&format!("recursors[{}].address", recursor.id), &recursor.address)?;
            require(&format!("recursors[{}].record", recursor.id), &recursor.record)?;
            require_port(&format!("recursors[{}].dns_port", recursor.id), recursor.dns_port)?;
            if !recursor_ids.insert(recursor.id.as_str()) {
                return Err(invalid(format!("duplicate recursor id {:?}", recursor.id)));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ExporterError {
    ExporterError::Config(message.into())
}

fn require(field: &str, value: &str) -> Result<(), ExporterError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    Ok(())
}

fn require_port(field: &str, port: u16) -> Result<(), ExporterError> {
    if port == 0 {
        return Err(invalid(format!("{field} must be a non-zero port")));
    }
    Ok(())
}
