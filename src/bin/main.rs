//! pdns-exporter binary entry point.

use clap::Parser;
use pdns_exporter::{server, telemetry, Config, ExporterServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Prometheus exporter probing authoritative DNS clusters and recursors.
#[derive(Parser, Debug)]
#[command(name = "pdns-exporter")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML or JSON).
    #[arg(short, long, default_value = "/etc/pdns-exporter/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load and validate configuration
    let config = Config::load(&args.config)?;

    // Initialize telemetry
    let handle = telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %config.exporter.listen_addr,
        mega_clusters = config.mega_clusters.len(),
        recursors = config.recursors.len(),
        probe_tls = config.probe_tls.enabled,
        "Starting pdns-exporter"
    );

    let server = ExporterServer::new(Arc::new(config), handle);
    let result = server.run(server::shutdown_signal()).await;

    // Shutdown telemetry
    telemetry::shutdown();

    if let Err(e) = result {
        error!("Metrics server error: {}", e);
        return Err(e.into());
    }

    info!("pdns-exporter shutdown complete");
    Ok(())
}
