//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM cancel a [`CancellationToken`] shared by every
//! long-running task of the service.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawns the signal listener when created. Cancels `token` on the first signal.
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    /// If no handler can be registered (restricted environments) the guard
    /// still works, it just never fires.
    pub fn new(token: CancellationToken) -> Self {
        let listener = token.clone();
        tokio::spawn(async move {
            let sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGINT handler: {}", e);
                    None
                }
            };

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    None
                }
            };

            match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
                        _ = term.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
                        _ = listener.cancelled() => return,
                    }
                }
                (Some(mut int), None) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, initiating graceful shutdown..."),
                        _ = listener.cancelled() => return,
                    }
                }
                (None, Some(mut term)) => {
                    tokio::select! {
                        _ = term.recv() => info!("Received SIGTERM, initiating graceful shutdown..."),
                        _ = listener.cancelled() => return,
                    }
                }
                (None, None) => {
                    warn!("No signal handlers registered - graceful shutdown disabled");
                    return;
                }
            }
            listener.cancel();
        });

        Self { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}
