//! Longshot Sync - Background pathpoint synchronization
//!
//! Provides:
//! - Path declaration with timestamp-based conflict resolution
//! - Order polling (server writes and reads) with acknowledgement
//! - Batched upload of queued samples
//! - Per-cycle persistence flushing
//!
//! ## Modules
//!
//! - [`engine`] - The [`Synchronizer`] running one reconciliation cycle
//! - [`runtime`] - The [`DeviceRuntime`] owning the background task

pub mod engine;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{CycleReport, Synchronizer};
pub use runtime::DeviceRuntime;

use longshot_core::domain::DomainError;
use thiserror::Error;

/// Errors that can occur when starting or stopping the synchronizer
#[derive(Debug, Error)]
pub enum SyncError {
    /// A device lifecycle rule was violated (e.g. `done()` called twice)
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// `done()` was called outside of a Tokio runtime
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// `done()` was called after `shutdown()`
    #[error("Device runtime already shut down for device {0}")]
    ShutDown(String),
}
