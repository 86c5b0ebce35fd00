//! Main entry point for the attrsync server.
//!
//! Loads configuration, starts the sync worker and periodic reconciler, and
//! serves the operator HTTP API until Ctrl+C or SIGTERM.

use std::sync::Arc;

use attrsync_server::{
    metrics,
    model::{AppState, Configuration},
    startup::{self, GracefulShutdown, ShutdownSignal, SyncComponents},
};
use tracing::{error, info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let logging_config = configuration.logging_config();
    let _logging_guard =
        startup::init_logging(&logging_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let prometheus = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus exporter unavailable: {}", e);
            None
        }
    };

    let components = SyncComponents::build(&configuration)?;

    let shutdown = ShutdownSignal::new();
    let _signals = startup::wait_for_shutdown_signal(shutdown.clone());
    let graceful = GracefulShutdown::new(shutdown.clone(), configuration.shutdown_timeout());

    let tasks = components.spawn(&shutdown);

    let address = configuration.server_address();
    let port = configuration.server_port();
    let app_state = Arc::new(AppState {
        queue: components.queue.clone(),
        enqueuer: components.enqueuer.clone(),
        periodic: components.periodic.clone(),
        shutdown: shutdown.clone(),
        prometheus,
    });

    info!("Starting attrsync server on {}:{}", address, port);
    let server = startup::sync_server(app_state, address, port)?;
    let handle = server.handle();
    let stopper = shutdown.clone();
    tokio::spawn(async move {
        stopper.wait().await;
        handle.stop(true).await;
    });

    if let Err(e) = server.await {
        error!("HTTP server error: {}", e);
    }

    graceful.drain(tasks).await;
    Ok(())
}
