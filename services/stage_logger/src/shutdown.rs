//! # Shutdown Controller
//!
//! Turns Ctrl+C into a cooperative stop request. The listener only flips the
//! shared flag; teardown stays with the sampling loop, which observes the flag
//! at the top of its next iteration.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shared run flag: `true` until the first stop request, then `false` forever
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clear the flag; returns `true` only for the call that actually cleared it
    pub fn request_stop(&self) -> bool {
        self.running.swap(false, Ordering::AcqRel)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Background listener that requests a stop on interrupt
pub struct ShutdownController;

impl ShutdownController {
    /// Listen for Ctrl+C for the rest of the process lifetime
    pub fn install(handle: StopHandle) -> JoinHandle<()> {
        Self::watch(handle, || async { tokio::signal::ctrl_c().await })
    }

    /// Request a stop each time `next_signal` resolves
    ///
    /// The first delivery clears the flag; later ones are no-ops. The task ends
    /// when the signal source fails.
    pub fn watch<F, Fut>(handle: StopHandle, mut next_signal: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = std::io::Result<()>> + Send,
    {
        tokio::spawn(async move {
            loop {
                if let Err(e) = next_signal().await {
                    warn!("Interrupt listener unavailable: {}", e);
                    return;
                }

                if handle.request_stop() {
                    info!("📡 Received Ctrl+C, stopping after the current sample...");
                } else {
                    debug!("Stop already requested, ignoring repeated interrupt");
                }
            }
        })
    }
}
