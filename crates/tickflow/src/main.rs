//! tickflow: ticker feed ingestion binary
//!
//! Subscribes to the exchange WebSocket ticker channel and writes validated
//! ticks to PostgreSQL in batches.

mod server;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server::ServerState;
use tickflow_ingest::{
    BatchWriter, FeedConnector, IngestConfig, InsertStatement, PgTickStore, PrometheusMetrics,
    TickQueue, WsTransport,
};

#[derive(Parser, Debug)]
#[command(name = "tickflow")]
#[command(about = "Exchange ticker feed to PostgreSQL ingestion")]
struct Args {
    /// Path to ingest configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Metrics server bind address
    #[arg(long, default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Override the WebSocket URL from the config file
    #[arg(long)]
    ws_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = IngestConfig::load(&args.config).map_err(|e| {
        error!(error = %e, "Failed to load config");
        e
    })?;
    if let Some(ws_url) = args.ws_url {
        config.ws_url = ws_url;
    }
    let config = Arc::new(config);
    let metrics_addr: SocketAddr = args.metrics_addr.parse()?;

    info!(
        ws_url = %config.ws_url,
        symbols = ?config.symbols,
        table = %config.table,
        batch_size = config.batch_size,
        queue_max_size = config.queue_max_size,
        "Starting tickflow"
    );

    let metrics = Arc::new(PrometheusMetrics::new()?);

    let store = PgTickStore::connect(&args.database_url)?;
    store
        .ensure_table(&InsertStatement::new(config.table.clone()))
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to prepare tick table");
            e
        })?;

    let queue = Arc::new(TickQueue::new(config.queue_max_size));
    let transport = Arc::new(WsTransport::new(config.ws_url.clone(), config.read_timeout()));

    let connector = FeedConnector::new(
        Arc::clone(&config),
        transport,
        Arc::clone(&queue),
        metrics.clone(),
    );
    let writer = BatchWriter::new(
        Arc::clone(&config),
        Arc::clone(&queue),
        Arc::new(store),
        metrics.clone(),
    );

    // Prometheus metrics HTTP server
    let server_shutdown = CancellationToken::new();
    let server_state = ServerState::new(Arc::clone(&metrics));
    let server = tokio::spawn(server::run_server(
        metrics_addr,
        server_state,
        server_shutdown.clone(),
    ));
    info!(addr = %metrics_addr, "metrics server listening");

    writer.start()?;
    connector.start()?;

    // Set up signal handlers for graceful shutdown
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("tickflow running, waiting for SIGTERM/SIGINT to stop");

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, shutting down gracefully"),
        _ = sigint.recv() => info!("SIGINT received, shutting down gracefully"),
    }

    // Connector first so the writer's final drain sees every enqueued tick
    connector.stop().await;
    writer.stop().await;

    server_shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Metrics server failed"),
        Err(e) => error!(error = %e, "Metrics server task panicked"),
    }

    info!("tickflow stopped");
    Ok(())
}
