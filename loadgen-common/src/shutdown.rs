use std::future::Future;
use std::sync::Arc;

use tokio::signal::unix::SignalKind;
use tracing::info;

use crate::controller::LoadController;

/// Completes on the first SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())
        .expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

/// Makes sure no workload process outlives a clean shutdown.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    controller: Arc<LoadController>,
}

impl ShutdownCoordinator {
    pub fn new(controller: Arc<LoadController>) -> Self {
        Self { controller }
    }

    /// Close the controller to new starts, then stop every tracked session and
    /// wait for the kill to complete.
    pub async fn drain(&self) -> usize {
        info!("shutting down gracefully, stopping all stress processes");
        let stopped = self.controller.close().await;
        info!(stopped, "stress processes stopped");
        stopped
    }

    /// Wait for `signal`, then drain. Meant as the graceful shutdown future of the server.
    pub async fn run_until<F>(self, signal: F) -> usize
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.drain().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn wait_for_signal_blocks_without_signal() {
        let result = timeout(Duration::from_millis(100), wait_for_signal()).await;
        assert!(
            result.is_err(),
            "wait_for_signal should not complete without a signal"
        );
    }
}
