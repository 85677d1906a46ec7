//! Ctrl-C / SIGTERM handling.
//!
//! A signal only stops the orchestrator's progress polling. Workers already
//! running are left alone and finish on their own.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::utils::errors::Result;

/// Shutdown coordinator
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled once shutdown is requested
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then cancel the token.
    pub async fn wait_for_signal(&self) -> Result<()> {
        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received SIGINT (Ctrl+C), stopping progress polling");
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, stopping progress polling");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, stopping progress polling");
        }

        self.trigger();
        Ok(())
    }

    /// Listen for signals in the background.
    pub fn spawn_listener(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = coordinator.wait_for_signal().await {
                error!(error = %e, "Failed to install signal handlers");
            }
        })
    }
}
