//! Metric publishing for pdns-exporter.
//!
//! Availability gauges keep the names dashboards already use
//! (`all_simple_clusters`, `response_code_from_recursor`, ...). The
//! exporter's own instrumentation is prefixed with `pdns_exporter_`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;
use tokio::time::Instant;

use crate::collector::ScrapeReport;

/// Label carrying the mega-cluster identity.
pub const CLUSTER_LABEL: &str = "cluster";

/// Label carrying the recursor identity.
pub const RECURSOR_LABEL: &str = "recursor";

/// Register help text for every metric the exporter emits.
pub fn describe() {
    describe_gauge!(
        "all_simple_clusters",
        "Number of simple clusters configured in the mega cluster"
    );
    describe_gauge!(
        "available_simple_clusters",
        "Number of available simple clusters in the mega cluster"
    );
    describe_gauge!(
        "disable_simple_clusters",
        "Number of unavailable simple clusters in the mega cluster"
    );
    describe_gauge!(
        "maintenance_simple_clusters",
        "Number of simple clusters flagged for maintenance in the mega cluster"
    );
    describe_gauge!(
        "response_code_from_recursor",
        "DNS response code from the recursor, 111 when no answer was received"
    );
    describe_gauge!(
        "ttr_from_recursor",
        "Recursor response time in milliseconds"
    );
    describe_counter!("pdns_exporter_scrapes_total", "Scrapes served");
    describe_histogram!(
        "pdns_exporter_scrape_duration_seconds",
        "Wall-clock time spent probing during one scrape"
    );
    describe_counter!(
        "pdns_exporter_probe_total",
        "Probes issued, by kind and outcome"
    );
}

/// Write one scrape's availability records as gauge samples.
pub fn publish(report: &ScrapeReport) {
    for mega in &report.mega_clusters {
        let id = mega.mega_cluster_id.clone();
        gauge!("all_simple_clusters", CLUSTER_LABEL => id.clone()).set(mega.total as f64);
        gauge!("available_simple_clusters", CLUSTER_LABEL => id.clone())
            .set(mega.available as f64);
        gauge!("disable_simple_clusters", CLUSTER_LABEL => id.clone()).set(mega.disabled as f64);
        gauge!("maintenance_simple_clusters", CLUSTER_LABEL => id).set(mega.maintenance as f64);
    }

    for recursor in &report.recursors {
        let id = recursor.recursor_id.clone();
        gauge!("response_code_from_recursor", RECURSOR_LABEL => id.clone())
            .set(recursor.response_code as f64);
        gauge!("ttr_from_recursor", RECURSOR_LABEL => id)
            .set(recursor.response_time.as_millis() as f64);
    }

    record_scrape(report.duration);
}

/// Record a completed scrape.
pub fn record_scrape(duration: Duration) {
    counter!("pdns_exporter_scrapes_total").increment(1);
    histogram!("pdns_exporter_scrape_duration_seconds").record(duration.as_secs_f64());
}

/// Probe kind for metrics.
#[derive(Debug, Clone, Copy)]
pub enum ProbeKind {
    /// DNS A-record query.
    Dns,
    /// Balancer API request.
    Http,
}

/// Record a finished probe.
pub fn record_probe(kind: ProbeKind, available: bool) {
    let kind_str = match kind {
        ProbeKind::Dns => "dns",
        ProbeKind::Http => "http",
    };
    let result_str = if available { "available" } else { "unavailable" };

    counter!("pdns_exporter_probe_total", "kind" => kind_str, "result" => result_str).increment(1);
}

/// Helper for timing operations. Follows the tokio clock, so paused test
/// time is observed.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
