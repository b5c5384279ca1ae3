use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use ops_gateway::config::{load_config, GatewaySettings};
use ops_gateway::lifecycle::{wait_for_signal, Shutdown};
use ops_gateway::observability::{logging, metrics};
use ops_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "ops-gateway")]
#[command(about = "Rate-limited, audited gateway for filesystem operations", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewaySettings::default(),
    };
    if let Some(bind) = cli.bind {
        settings.listener.bind_address = bind;
    }

    logging::init(&settings.observability);
    tracing::info!("ops-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&settings.listener.bind_address).await?;
    let server = HttpServer::new(settings)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
