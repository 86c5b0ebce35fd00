//! Graceful shutdown handling for the attrsync server
//!
//! A single `watch` channel carries the shutdown flag to the worker loop,
//! the periodic reconciler and the HTTP server.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown flag shared by every background component
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Get a receiver for shutdown notifications
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolve once shutdown has been triggered
    pub async fn wait(&self) {
        let mut receiver = self.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = receiver.wait_for(|stop| *stop).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Trigger `shutdown` on Ctrl+C or SIGTERM
pub fn wait_for_shutdown_signal(shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c() => {
                info!("Received Ctrl+C, initiating graceful shutdown...");
            }
            _ = terminate() => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
            _ = shutdown.wait() => return,
        }
        shutdown.shutdown();
    })
}

/// Graceful shutdown coordinator
///
/// Waits for background tasks to finish, bounded by a timeout
pub struct GracefulShutdown {
    shutdown_signal: ShutdownSignal,
    shutdown_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(shutdown_signal: ShutdownSignal, shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_signal,
            shutdown_timeout,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Trigger shutdown and wait for `tasks` to exit
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>) {
        self.shutdown_signal.shutdown();
        info!(
            "Shutdown initiated, waiting up to {:?} for {} background tasks...",
            self.shutdown_timeout,
            tasks.len()
        );

        let all = async {
            for task in tasks {
                if let Err(e) = task.await {
                    error!("Background task failed during shutdown: {}", e);
                }
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, all).await.is_err() {
            warn!(
                "Background tasks did not stop within {:?}, exiting anyway",
                self.shutdown_timeout
            );
        } else {
            info!("Shutdown complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let rx = signal.subscribe();
        assert!(!signal.is_shutdown());

        let signal_clone = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signal_clone.shutdown();
        });

        let result = tokio::time::timeout(Duration::from_millis(500), signal.wait()).await;
        assert!(result.is_ok());
        assert!(*rx.borrow());
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_sees_flag() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        assert!(*signal.subscribe().borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_tasks() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        let task = tokio::spawn(async move {
            let _ = rx.wait_for(|stop| *stop).await;
        });

        let graceful = GracefulShutdown::new(signal.clone(), Duration::from_secs(5));
        graceful.drain(vec![task]).await;
        assert!(signal.is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_gives_up_after_timeout() {
        let signal = ShutdownSignal::new();
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let graceful = GracefulShutdown::new(signal, Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        graceful.drain(vec![stuck]).await;
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
