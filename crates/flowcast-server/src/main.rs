//! Flowcast - Main Entry Point
//!
//! ```bash
//! flowcast --config /etc/flowcast/flowcast.json
//! flowcast --interface eth0 --count 10000 --output packets.csv
//! flowcast --no-capture --listen 127.0.0.1:8000
//! ```

use clap::Parser;
use flowcast_server::{
    build_engine, install_metrics_exporter, serve, spawn_sampler, AppState, Capture, ServerConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "flowcast")]
#[command(version)]
#[command(about = "Traffic classification, bandwidth prediction and QoS service", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, short, env = "FLOWCAST_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long, env = "FLOWCAST_LISTEN")]
    listen: Option<SocketAddr>,

    /// Prometheus exporter address
    #[arg(long, env = "FLOWCAST_METRICS")]
    metrics: Option<SocketAddr>,

    /// Capture interface (all interfaces when omitted)
    #[arg(long, short)]
    interface: Option<String>,

    /// Stop capturing after this many frames (0 = unlimited)
    #[arg(long)]
    count: Option<u64>,

    /// Write every classified packet to this CSV file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Linear model parameter file
    #[arg(long)]
    model: Option<PathBuf>,

    /// Serve the API without capturing
    #[arg(long)]
    no_capture: bool,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(metrics) = self.metrics {
            config.metrics_addr = Some(metrics);
        }
        if let Some(interface) = self.interface {
            config.capture.interface = Some(interface);
        }
        if let Some(count) = self.count {
            config.capture.packet_count = count;
        }
        if let Some(output) = self.output {
            config.capture.csv_output = Some(output);
        }
        if let Some(model) = self.model {
            config.model_path = Some(model);
        }
        if self.no_capture {
            config.capture.enabled = false;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Flowcast v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let mut config = ServerConfig::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);

    if let Some(addr) = config.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    let engine = Arc::new(build_engine(&config)?);

    // Capture is best effort: without CAP_NET_RAW the API still serves
    let capture = if config.capture.enabled {
        let started = Capture::open_source(&config.capture)
            .and_then(|source| Capture::start(&engine, &config.capture, source));
        match started {
            Ok(capture) => Some(capture),
            Err(e) => {
                tracing::warn!(error = %e, "capture unavailable, serving API only");
                None
            }
        }
    } else {
        None
    };

    let sink = capture.as_ref().and_then(Capture::sink);
    let sampler = spawn_sampler(Arc::clone(&engine), config.capture.sample_interval(), sink);

    let state = Arc::new(AppState::new(Arc::clone(&engine)));
    let served = serve(config.listen_addr, state, shutdown_signal()).await;

    sampler.abort();
    if let Some(capture) = capture {
        capture.stop();
    }
    let stats = engine.stats();
    tracing::info!(
        received = stats.frames_received,
        processed = stats.frames_processed,
        malformed = stats.frames_malformed,
        "flowcast stopped"
    );

    served?;
    Ok(())
}
