//! Scrape collector: runs both availability engines for one scrape.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info_span, Instrument};

use crate::cluster::{self, MegaClusterAvailability};
use crate::config::Config;
use crate::metrics::Timer;
use crate::probe::{NetworkProber, Prober};
use crate::recursor::{self, RecursorAvailability};

/// Complete result set of one scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    /// One record per configured mega cluster, unordered.
    pub mega_clusters: Vec<MegaClusterAvailability>,
    /// One record per configured recursor, unordered.
    pub recursors: Vec<RecursorAvailability>,
    /// Wall-clock time spent probing.
    pub duration: Duration,
}

/// Probes every configured target on demand. Nothing is cached between
/// scrapes.
#[derive(Debug, Clone)]
pub struct Collector {
    config: Arc<Config>,
}

impl Collector {
    /// Create a collector over an already-validated configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// The configuration this collector probes.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one scrape with freshly built network clients.
    pub async fn scrape(&self) -> ScrapeReport {
        let prober = NetworkProber::for_scrape(&self.config.probe, &self.config.probe_tls).await;
        self.scrape_with(Arc::new(prober)).await
    }

    /// Run one scrape with the given prober.
    ///
    /// Both engines run concurrently; returns once both delivered their
    /// complete result sets.
    pub async fn scrape_with(&self, prober: Arc<dyn Prober>) -> ScrapeReport {
        let timer = Timer::start();
        let probe = &self.config.probe;

        let clusters = cluster::check_mega_clusters(
            &self.config.mega_clusters,
            prober.clone(),
            self.config.probe_tls.enabled,
            probe.cluster_deadline(),
        )
        .instrument(info_span!("cluster_engine"));
        let recursors = recursor::check_recursors(
            &self.config.recursors,
            prober,
            probe.recursor_deadline(),
        )
        .instrument(info_span!("recursor_engine"));

        let (mega_clusters, recursors) = tokio::join!(clusters, recursors);
        let duration = timer.elapsed();

        debug!(
            mega_clusters = mega_clusters.len(),
            recursors = recursors.len(),
            elapsed_ms = duration.as_millis() as u64,
            "scrape complete"
        );

        ScrapeReport {
            mega_clusters,
            recursors,
            duration,
        }
    }
}
