//! Scrape endpoint setup and lifecycle management.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::collector::Collector;
use crate::config::{Config, HEALTH_PATH};
use crate::error::ExporterError;
use crate::metrics;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

struct ScrapeState {
    collector: Collector,
    handle: PrometheusHandle,
    // One scrape at a time: gauges are shared by every scrape.
    scrape_lock: Mutex<()>,
}

/// HTTP server answering metric scrapes.
pub struct ExporterServer {
    config: Arc<Config>,
    state: Arc<ScrapeState>,
}

impl ExporterServer {
    /// Create a server rendering metrics from `handle`.
    pub fn new(config: Arc<Config>, handle: PrometheusHandle) -> Self {
        let state = Arc::new(ScrapeState {
            collector: Collector::new(config.clone()),
            handle,
            scrape_lock: Mutex::new(()),
        });
        Self { config, state }
    }

    /// Routes: the metrics path and `/healthz`.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.exporter.metrics_path, get(scrape))
            .route(HEALTH_PATH, get(healthz))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ExporterError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.exporter.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ExporterError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(
            addr = %listener.local_addr()?,
            path = %self.config.exporter.metrics_path,
            mega_clusters = self.config.mega_clusters.len(),
            recursors = self.config.recursors.len(),
            "Serving metrics"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Metrics server stopped");
        Ok(())
    }
}

async fn scrape(State(state): State<Arc<ScrapeState>>) -> impl IntoResponse {
    let _guard = state.scrape_lock.lock().await;
    debug!("scrape requested");

    let report = state.collector.scrape().await;
    metrics::publish(&report);

    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.handle.render(),
    )
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
