//! Telemetry setup for pdns-exporter.
//!
//! Supports:
//! - Tracing with configurable log levels, text or JSON lines
//! - The global Prometheus recorder rendered by the scrape endpoint
//! - OpenTelemetry tracing export (with `otel` feature)

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, TelemetryConfig};

#[cfg(feature = "otel")]
use std::sync::OnceLock;
#[cfg(feature = "otel")]
static TRACER_PROVIDER: OnceLock<opentelemetry_sdk::trace::SdkTracerProvider> = OnceLock::new();

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Initialize telemetry and install the global metrics recorder.
///
/// Returns the handle the scrape endpoint renders.
pub fn init(config: &TelemetryConfig) -> Result<PrometheusHandle, BoxError> {
    init_tracing(config)?;

    let handle = PrometheusBuilder::new().install_recorder()?;
    crate::metrics::describe();

    Ok(handle)
}

fn fmt_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format {
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    }
}

fn init_tracing(config: &TelemetryConfig) -> Result<(), BoxError> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    #[cfg(feature = "otel")]
    if let Some(ref otel_config) = config.opentelemetry {
        use opentelemetry::trace::TracerProvider;
        use opentelemetry::KeyValue;
        use opentelemetry_otlp::WithExportConfig;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&otel_config.endpoint)
            .build()?;

        let resource = opentelemetry_sdk::Resource::builder()
            .with_attributes([
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    otel_config.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    env!("CARGO_PKG_VERSION"),
                ),
            ])
            .build();

        let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build();
        let tracer = provider.tracer("pdns-exporter");
        let _ = TRACER_PROVIDER.set(provider);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer(config.log_format))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .try_init()?;

        tracing::info!(endpoint = %otel_config.endpoint, "OpenTelemetry tracing enabled");
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(config.log_format))
        .try_init()?;

    Ok(())
}

/// Shutdown telemetry (flush OTLP spans).
pub fn shutdown() {
    #[cfg(feature = "otel")]
    {
        if let Some(provider) = TRACER_PROVIDER.get() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Error shutting down tracer provider: {}", e);
            }
        }
    }
}
