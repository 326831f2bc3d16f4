//! Shutdown coordination for the run loop
//!
//! One root `CancellationToken` is cancelled by Ctrl+C or by an optional
//! deadline; the report loop and any helper tasks hold child tokens.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controller cancelled on Ctrl+C
    pub fn with_ctrl_c() -> Self {
        let controller = Self::new();
        let token = controller.token.clone();

        tokio::spawn(async move {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        info!("Received Ctrl+C, initiating graceful shutdown...");
                        token.cancel();
                    }
                    Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
                },
                _ = token.cancelled() => {}
            }
        });

        controller
    }

    /// Cancel once `after` has elapsed
    pub fn cancel_after(&self, after: Duration) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    info!(seconds = after.as_secs(), "Run duration elapsed");
                    token.cancel();
                }
                _ = token.cancelled() => {}
            }
        });
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Cancel every child token and stop the signal and deadline tasks
    pub fn shutdown(&self) {
        self.token.cancel();
    }
}
