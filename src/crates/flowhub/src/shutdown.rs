//! Graceful shutdown coordination
//!
//! One coordinator fans the SIGINT/SIGTERM signal out to the HTTP
//! server, the task fabric loops and in-flight executions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownCoordinator {
    /// Create a coordinator
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; idempotent
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Wait for the shutdown signal
    pub async fn wait(&self) {
        if self.is_requested() {
            return;
        }
        let mut notified = std::pin::pin!(self.notify.notified());
        notified.as_mut().enable();
        if self.is_requested() {
            return;
        }
        notified.await;
    }

    /// Install SIGINT/SIGTERM handlers that trigger this coordinator
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};

                let mut sigint = match signal(SignalKind::interrupt()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "failed to install SIGINT handler");
                        return;
                    }
                };
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        warn!(error = %e, "failed to install SIGTERM handler");
                        return;
                    }
                };

                tokio::select! {
                    _ = sigint.recv() => warn!("received SIGINT"),
                    _ = sigterm.recv() => warn!("received SIGTERM"),
                }
                coordinator.request();
            }

            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("received Ctrl+C");
                    coordinator.request();
                }
            }
        })
    }
}
