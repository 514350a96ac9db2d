//! Signal handling for graceful shutdown.

use std::sync::Arc;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::watch;

/// Installed SIGTERM and SIGINT handlers.
pub struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Completes when a shutdown signal is received.
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown");
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }

    /// Flip `shutdown_tx` once a shutdown signal arrives.
    pub fn forward_to(mut self, shutdown_tx: Arc<watch::Sender<bool>>) {
        tokio::spawn(async move {
            self.recv().await;
            let _ = shutdown_tx.send(true);
        });
    }
}
