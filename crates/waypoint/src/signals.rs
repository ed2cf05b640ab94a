//! Graceful shutdown signal handling.

use tokio::sync::oneshot;
use tracing::info;

/// Returns a receiver that fires once a termination signal arrives.
///
/// Unix listens for SIGINT and SIGTERM; Windows handles Ctrl+C.
pub async fn shutdown_signal() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("Failed to install SIGINT handler: {}", e);
                    return;
                }
            };
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    return;
                }
            };

            tokio::select! {
                _ = sigint.recv() => info!("SIGINT received - shutting down"),
                _ = sigterm.recv() => info!("SIGTERM received - shutting down"),
            }
        }

        #[cfg(windows)]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl+C received - shutting down"),
                Err(e) => {
                    tracing::error!("Failed to install Ctrl+C handler: {}", e);
                    return;
                }
            }
        }

        let _ = tx.send(());
    });

    rx
}
