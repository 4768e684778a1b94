//! Minion daemon
//!
//! Installs, builds and drives local services through a fixed subcommand
//! vocabulary (`install`, `start`, `stop`, `status`, `stats`, `remove`).
//!
//! # Features
//!
//! - In-memory registry of installed services (id -> source)
//! - Isolated build/runtime environment per service
//! - JSON-RPC endpoint at `/rpc`
//! - Periodic `stats:<id>` events on the `/events` stream

pub mod environment;
pub mod error;
pub mod events;
pub mod http_server;
pub mod manager;
pub mod registry;
pub mod rpc;
pub mod runner;
pub mod stats;

pub use error::{ErrorKind, Result, ServiceError};
pub use events::{EventBus, EventSink};
pub use manager::ServiceManager;
pub use runner::{ProcessExecutor, ServiceExecutor};

use crate::config::DaemonConfig;
use environment::Layout;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Run the daemon until Ctrl+C.
///
/// This is the main entry point called by the `minion` binary.
pub async fn run(
    config: DaemonConfig,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    log::info!("Starting minion daemon...");

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    // Set up Ctrl+C handler
    ctrlc::set_handler({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            log::info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_tx.send(()).ok();
        }
    })?;

    let listener = TcpListener::bind(&config.listen).await?;
    serve_until(&config, listener, shutdown_rx).await?;

    log::info!("Minion daemon stopped.");
    Ok(())
}

/// Wire manager, stats publisher and HTTP server on `listener` and run them
/// until `shutdown` fires.
pub async fn serve_until(
    config: &DaemonConfig,
    listener: TcpListener,
    shutdown: watch::Receiver<()>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tokio::fs::create_dir_all(&config.root).await?;

    let layout = Layout::new(&config.root, &config.toolchain);
    log::info!("Root: {}", layout.root().display());
    log::info!("Toolchain: {}", layout.toolchain_root().display());

    let executor = ProcessExecutor::from_config(config);
    let manager = Arc::new(ServiceManager::new(layout, executor));
    let events = Arc::new(EventBus::new());

    // Start stats publisher
    let publisher = stats::StatsPublisher::new(
        Arc::clone(&manager),
        Arc::clone(&events),
        config.stats_interval(),
    );
    let publisher_task = tokio::spawn(publisher.run(shutdown.clone()));

    let router = http_server::create_router(manager, (*events).clone(), shutdown.clone());
    log::info!("Minion daemon running. Press Ctrl+C to exit.");
    log::info!("  JSON-RPC: POST /rpc");
    log::info!("  Events:   GET /events");

    let served = http_server::serve(listener, router, shutdown).await;

    if let Err(e) = publisher_task.await {
        log::warn!("Stats publisher task failed: {}", e);
    }

    served?;
    Ok(())
}
