//! Availability engine for authority mega-clusters.
//!
//! ```text
//! check_mega_clusters
//!   └─ one task per mega cluster            (JoinSet)
//!        └─ one task per simple cluster     (JoinSet)
//!             ├─ DNS  → master  ─┐
//!             ├─ DNS  → slave   ─┼─▶ mpsc(3) ─▶ fan-in until 3 results
//!             └─ HTTP → balancer ┘              or the cluster deadline
//! ```
//!
//! A simple cluster is available iff at least one of master/slave answered
//! and the balancer API returned 200. Probes that miss the deadline count
//! as absent evidence, never as failures on their own.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info_span, Instrument};

use crate::config::{MegaClusterConfig, SimpleClusterConfig};
use crate::probe::{DnsProbeRequest, DnsProbeResult, HttpProbeRequest, HttpProbeResult, Prober};

/// Probes launched per simple cluster: master, slave and balancer.
const PROBES_PER_SIMPLE_CLUSTER: usize = 3;

/// Per-scrape availability report of one mega cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MegaClusterAvailability {
    /// Mega-cluster identity.
    pub mega_cluster_id: String,
    /// Simple clusters configured.
    pub total: u32,
    /// Simple clusters whose verdict was available.
    pub available: u32,
    /// Simple clusters whose verdict was unavailable.
    pub disabled: u32,
    /// Simple clusters flagged for maintenance, counted independently.
    pub maintenance: u32,
}

/// Verdict for one simple cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClusterVerdict {
    /// Simple-cluster identity.
    pub cluster_id: String,
    /// Computed availability.
    pub available: bool,
}

/// Probe evidence collected for one simple cluster before its deadline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClusterEvidence {
    /// Availability of every DNS probe that reported in time.
    pub dns: Vec<bool>,
    /// Availability of every HTTP probe that reported in time.
    pub http: Vec<bool>,
}

impl ClusterEvidence {
    /// Any DNS node answered and the balancer answered 200.
    ///
    /// Empty evidence on either side means unavailable.
    pub fn is_available(&self) -> bool {
        self.dns.contains(&true) && self.http.contains(&true)
    }
}

enum ProbeOutcome {
    Dns(DnsProbeResult),
    Http(HttpProbeResult),
}

/// Check every mega cluster concurrently.
///
/// Returns exactly one record per configured mega cluster, in no
/// particular order.
pub async fn check_mega_clusters(
    mega_clusters: &[MegaClusterConfig],
    prober: Arc<dyn Prober>,
    use_tls: bool,
    deadline: Duration,
) -> Vec<MegaClusterAvailability> {
    let mut tasks = JoinSet::new();

    for mega in mega_clusters {
        let mega = mega.clone();
        let prober = prober.clone();
        let span = info_span!("mega_cluster", id = %mega.id);
        tasks.spawn(
            async move { check_mega_cluster(&mega, prober, use_tls, deadline).await }
                .instrument(span),
        );
    }

    let mut reports = Vec::with_capacity(mega_clusters.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => error!(error = %e, "mega cluster task failed"),
        }
    }

    // A failed task reports every member as disabled.
    let reported: HashSet<String> = reports.iter().map(|r| r.mega_cluster_id.clone()).collect();
    for mega in mega_clusters {
        if !reported.contains(&mega.id) {
            reports.push(all_disabled(mega));
        }
    }

    reports
}

fn all_disabled(mega: &MegaClusterConfig) -> MegaClusterAvailability {
    let total = mega.simple_clusters.len() as u32;
    MegaClusterAvailability {
        mega_cluster_id: mega.id.clone(),
        total,
        available: 0,
        disabled: total,
        maintenance: mega.simple_clusters.iter().filter(|s| s.maintenance).count() as u32,
    }
}

/// Check one mega cluster: every member simple cluster in parallel, then
/// sum the verdicts.
pub async fn check_mega_cluster(
    mega: &MegaClusterConfig,
    prober: Arc<dyn Prober>,
    use_tls: bool,
    deadline: Duration,
) -> MegaClusterAvailability {
    debug!(
        simple_clusters = mega.simple_clusters.len(),
        "starting mega cluster survey"
    );

    let mut report = MegaClusterAvailability {
        mega_cluster_id: mega.id.clone(),
        total: mega.simple_clusters.len() as u32,
        available: 0,
        disabled: 0,
        maintenance: 0,
    };

    let mut tasks = JoinSet::new();
    for simple in &mega.simple_clusters {
        if simple.maintenance {
            report.maintenance += 1;
        }

        let simple = simple.clone();
        let prober = prober.clone();
        let span = info_span!("simple_cluster", id = %simple.id);
        tasks.spawn(
            async move { check_simple_cluster(&simple, prober, use_tls, deadline).await }
                .instrument(span),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(verdict) if verdict.available => report.available += 1,
            Ok(_) => report.disabled += 1,
            Err(e) => {
                error!(error = %e, "simple cluster task failed, counting as disabled");
                report.disabled += 1;
            }
        }
    }

    debug!(
        total = report.total,
        available = report.available,
        disabled = report.disabled,
        maintenance = report.maintenance,
        "mega cluster survey complete"
    );

    report
}

/// Probe one simple cluster and compute its verdict.
pub async fn check_simple_cluster(
    simple: &SimpleClusterConfig,
    prober: Arc<dyn Prober>,
    use_tls: bool,
    deadline: Duration,
) -> SimpleClusterVerdict {
    debug!(
        master = %simple.master,
        slave = %simple.slave,
        balancer = %simple.balancer,
        "starting simple cluster survey"
    );

    let (tx, rx) = mpsc::channel(PROBES_PER_SIMPLE_CLUSTER);

    for address in [&simple.master, &simple.slave] {
        let request = DnsProbeRequest {
            target_id: simple.id.clone(),
            address: address.clone(),
            port: simple.dns_port,
            query_name: simple.record.clone(),
        };
        let prober = prober.clone();
        let tx = tx.clone();
        tokio::spawn(
            async move {
                let result = prober.probe_dns(request).await;
                // The receiver is gone once the deadline fired.
                let _ = tx.send(ProbeOutcome::Dns(result)).await;
            }
            .in_current_span(),
        );
    }

    let request = HttpProbeRequest {
        target_id: simple.id.clone(),
        address: simple.balancer.clone(),
        port: simple.http_port,
        api_token: simple.api_token.clone(),
        use_tls,
    };
    tokio::spawn(
        async move {
            let result = prober.probe_http(request).await;
            let _ = tx.send(ProbeOutcome::Http(result)).await;
        }
        .in_current_span(),
    );

    let evidence = collect_evidence(rx, deadline).await;
    let available = evidence.is_available();

    debug!(
        dns = ?evidence.dns,
        http = ?evidence.http,
        available,
        "simple cluster survey complete"
    );

    SimpleClusterVerdict {
        cluster_id: simple.id.clone(),
        available,
    }
}

/// Drain probe outcomes until all producers reported, every sender is gone,
/// or the deadline fires. Consumes the receiver, so late senders fail
/// immediately instead of waiting.
async fn collect_evidence(
    mut rx: mpsc::Receiver<ProbeOutcome>,
    deadline: Duration,
) -> ClusterEvidence {
    let mut evidence = ClusterEvidence::default();
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    for _ in 0..PROBES_PER_SIMPLE_CLUSTER {
        tokio::select! {
            outcome = rx.recv() => match outcome {
                Some(ProbeOutcome::Dns(result)) => evidence.dns.push(result.available),
                Some(ProbeOutcome::Http(result)) => evidence.http.push(result.available),
                None => break,
            },
            _ = &mut sleep => {
                debug!(
                    received = evidence.dns.len() + evidence.http.len(),
                    expected = PROBES_PER_SIMPLE_CLUSTER,
                    "cluster deadline reached"
                );
                break;
            }
        }
    }

    evidence
}
