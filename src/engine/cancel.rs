// src/engine/cancel.rs
use thiserror::Error;

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

/// Marker error returned by an operation that stopped because its group was cancelled.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Lets blocking operations bail out of a cancelled group with `?`.
///
/// Cancellation is advisory: nothing interrupts a running operation, so tasks
/// that want to stop early call [`check`](Self::check) between steps, or await
/// `cancelled()` on the async path.
pub trait CancellationExt {
    /// `Err(Cancelled)` once the token has been cancelled
    fn check(&self) -> Result<(), Cancelled>;
}

impl CancellationExt for CancellationToken {
    fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
