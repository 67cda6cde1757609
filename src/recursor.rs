//! Availability engine for upstream recursive resolvers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info_span, Instrument};

use crate::config::RecursorConfig;
use crate::metrics::Timer;
use crate::probe::{DnsProbeRequest, Prober};

/// Response code reported when the recursor produced no answer.
pub const NO_ANSWER_RCODE: u16 = 111;

/// Per-scrape availability report of one recursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecursorAvailability {
    /// Recursor identity.
    pub recursor_id: String,
    /// DNS response code, or [`NO_ANSWER_RCODE`].
    pub response_code: u16,
    /// Measured response latency.
    pub response_time: Duration,
}

/// Check every recursor concurrently, one DNS probe each.
///
/// Returns exactly one record per configured recursor, in no particular
/// order.
pub async fn check_recursors(
    recursors: &[RecursorConfig],
    prober: Arc<dyn Prober>,
    deadline: Duration,
) -> Vec<RecursorAvailability> {
    let timer = Timer::start();
    let mut tasks = JoinSet::new();

    for recursor in recursors {
        let recursor = recursor.clone();
        let prober = prober.clone();
        let span = info_span!("recursor", id = %recursor.id);
        tasks.spawn(async move { check_recursor(&recursor, prober, deadline).await }.instrument(span));
    }

    let mut reports = Vec::with_capacity(recursors.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => error!(error = %e, "recursor task failed"),
        }
    }

    // A failed task still owes its recursor a record.
    let reported: HashSet<String> = reports.iter().map(|r| r.recursor_id.clone()).collect();
    for recursor in recursors {
        if !reported.contains(&recursor.id) {
            reports.push(RecursorAvailability {
                recursor_id: recursor.id.clone(),
                response_code: NO_ANSWER_RCODE,
                response_time: timer.elapsed(),
            });
        }
    }

    reports
}

/// Probe one recursor, bounded by `deadline` on top of the probe's own
/// transport timeout.
pub async fn check_recursor(
    recursor: &RecursorConfig,
    prober: Arc<dyn Prober>,
    deadline: Duration,
) -> RecursorAvailability {
    debug!(address = %recursor.address, "starting recursor survey");

    let request = DnsProbeRequest {
        target_id: recursor.id.clone(),
        address: recursor.address.clone(),
        port: recursor.dns_port,
        query_name: recursor.record.clone(),
    };

    let timer = Timer::start();
    let report = match tokio::time::timeout(deadline, prober.probe_dns(request)).await {
        Ok(result) => RecursorAvailability {
            recursor_id: recursor.id.clone(),
            response_code: result.response_code().unwrap_or(NO_ANSWER_RCODE),
            response_time: result.response_time,
        },
        Err(_) => {
            debug!("recursor deadline reached");
            RecursorAvailability {
                recursor_id: recursor.id.clone(),
                response_code: NO_ANSWER_RCODE,
                response_time: timer.elapsed(),
            }
        }
    };

    debug!(
        rcode = report.response_code,
        elapsed_ms = report.response_time.as_millis() as u64,
        "recursor survey complete"
    );

    report
}
