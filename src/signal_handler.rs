use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared stop flag for long-running work. Ctrl-C (and SIGTERM on unix)
/// set it; workers poll it between units of work.
#[derive(Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::AcqRel) {
            info!("Graceful shutdown requested; finishing current work");
        }
    }

    /// Spawn listeners that flip the flag on Ctrl-C or SIGTERM.
    pub fn listen(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let ctrl_c = self.clone();
        handles.push(tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Received Ctrl-C");
                    ctrl_c.request();
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        }));

        #[cfg(unix)]
        {
            let term = self.clone();
            handles.push(tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            warn!("Received SIGTERM signal");
                            term.request();
                        }
                    }
                    Err(e) => warn!("Failed to create SIGTERM handler: {}", e),
                }
            }));
        }

        handles
    }

    pub fn status_text(&self) -> &'static str {
        if self.is_requested() {
            "Finishing current downloads..."
        } else {
            "Press Ctrl-C to stop after current files"
        }
    }
}
