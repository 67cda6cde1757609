//! pdns-exporter - A pull-based availability exporter for authoritative DNS
//! clusters and upstream recursors.
//!
//! Every metrics scrape probes the whole configured fleet from scratch and
//! reports the aggregated availability as Prometheus gauges. Nothing is
//! cached between scrapes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          pdns-exporter                           │
//! │                                                                  │
//! │  GET /metrics ──▶ ┌──────────────┐                               │
//! │                   │  Collector   │                               │
//! │                   └──────┬───────┘                               │
//! │              ┌───────────┴────────────┐                          │
//! │              ▼                        ▼                          │
//! │   ┌────────────────────┐   ┌────────────────────┐                │
//! │   │  Cluster engine    │   │  Recursor engine   │                │
//! │   │  per mega cluster  │   │  per recursor      │                │
//! │   │   per simple       │   │   1 × DNS probe    │                │
//! │   │   2 × DNS, 1 × HTTP│   │                    │                │
//! │   └─────────┬──────────┘   └─────────┬──────────┘                │
//! │             └────────────┬───────────┘                           │
//! │                          ▼                                       │
//! │                 Prometheus gauges                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Verdicts
//!
//! A simple cluster is available iff master or slave answered a DNS query
//! and the balancer API returned 200, using only the results that arrived
//! within the cluster deadline. A recursor that did not answer reports
//! response code 111.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pdns_exporter::{Collector, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::load("config.toml".as_ref()).unwrap();
//!     let collector = Collector::new(Arc::new(config));
//!
//!     let report = collector.scrape().await;
//!     for mega in &report.mega_clusters {
//!         println!("{}: {}/{}", mega.mega_cluster_id, mega.available, mega.total);
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod recursor;
pub mod server;
pub mod telemetry;

// Re-export main types
pub use cluster::MegaClusterAvailability;
pub use collector::{Collector, ScrapeReport};
pub use config::{Config, MegaClusterConfig, RecursorConfig, SimpleClusterConfig};
pub use error::ExporterError;
pub use probe::{NetworkProber, Prober};
pub use recursor::RecursorAvailability;
pub use server::ExporterServer;
