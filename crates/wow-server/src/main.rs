//! wow-server: the World of Wisdom proof-of-work quote server.
//!
//! Single OS process, Tokio async runtime. Binds a `TcpListener` and runs
//! the accept loop (Section 5 of the design) until a shutdown signal
//! arrives, at which point in-flight conversations are given a grace
//! period to finish (Section 5).

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use wow_server::config::ServerConfig;
use wow_server::log_sink::TracingLogSink;
use wow_server::quotes::StaticQuoteSource;
use wow_server::state::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("wow=info".parse()?),
        )
        .init();

    info!("wow-server starting");

    // Config errors (e.g. a missing or too-short WOW_MASTER_SECRET) are
    // fatal at startup (Section 7 of the design).
    let config = ServerConfig::load()?;
    let port = config.port;

    let quote_source = Arc::new(StaticQuoteSource::new());
    let log_sink = Arc::new(TracingLogSink);

    // Key store bootstrap/decrypt failures are fatal at startup (Section 7).
    let state = Arc::new(ServerState::new(config, quote_source, log_sink)?);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let accept_task = tokio::spawn(wow_server::accept::serve(state, listener, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, shutting down");
    let _ = shutdown_tx.send(());

    // `accept::serve` owns the grace-period drain itself; just wait for it
    // to finish rather than racing and cancelling it outright.
    let _ = accept_task.await;

    info!("wow-server stopped");
    Ok(())
}
