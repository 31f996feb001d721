use tokio::sync::broadcast;
use tracing::{error, info};

/// Broadcast a shutdown when the process receives Ctrl+C.
///
/// Loops stop at their next suspension point when the receiver fires; any
/// in-flight delivery is awaited before they return.
pub fn setup_shutdown_handler() -> broadcast::Receiver<()> {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {e}");
            // Dropping the sender would read as a shutdown; keep it alive.
            std::future::pending::<()>().await;
        }

        info!("Received interrupt signal (Ctrl+C)");
        let _ = shutdown_tx.send(());
    });

    shutdown_rx
}
