//! Cancellation state shared by the kitchen and the graph loader.
//!
//! Cancellation is coarse-grained: it is checked between cook phases and on
//! every loader iteration, never in the middle of a plugin hook.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag.
///
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Create a signal that has not been aborted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested
    ///
    /// Uses Relaxed ordering for performance - worst case is cooking
    /// a few more resources before stopping
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Setup the Ctrl+C handler. Call once at program start.
///
/// The first Ctrl+C aborts the signal (in-flight cooks stop at the next phase
/// boundary); a second one exits immediately.
pub fn setup_abort_handler(signal: AbortSignal) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        if signal.is_aborted() {
            std::process::exit(130);
        }
        crate::log!("build"; "aborting...");
        signal.abort();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}
