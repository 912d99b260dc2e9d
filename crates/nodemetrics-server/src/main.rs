mod handlers;
mod router;

use std::sync::Arc;

use clap::Parser;
use nodemetrics_collector::{NodeCollector, Registry, RequestCounter, SystemSource};
use nodemetrics_common::error::MetricsError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::router::{ExporterState, exporter_router, validate_metrics_path};

#[derive(Parser)]
#[command(name = "nodemetrics", about = "Host and process metrics exporter")]
struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    #[arg(long, default_value = "8080")]
    port: u16,

    #[arg(long, default_value = "/metrics")]
    metrics_path: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("nodemetrics=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    validate_metrics_path(&cli.metrics_path)?;

    let requests = Arc::new(RequestCounter::new());
    let collector = NodeCollector::new(SystemSource::new(), Arc::clone(&requests))?;
    info!(hostname = collector.hostname(), "node collector initialized");

    let mut registry = Registry::new();
    registry.register(collector).inspect_err(|err: &MetricsError| {
        error!(error = %err, "collector registration rejected");
    })?;

    let state = Arc::new(ExporterState {
        registry: Arc::new(registry),
        requests,
    });
    let app = exporter_router(state, &cli.metrics_path);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("nodemetrics listening on {addr}, metrics at {}", cli.metrics_path);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("nodemetrics stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
