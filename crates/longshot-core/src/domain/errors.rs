//! Domain error types
//!
//! Errors surfaced to application code by [`Device`](super::Device) and
//! [`Pathpoint`](super::Pathpoint) operations. Transport failures never
//! reach this type; the synchronizer recovers from them on its own.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Path is empty or otherwise cannot carry a device prefix
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Device prefix is not exactly one character
    #[error("Invalid device prefix: {0:?}")]
    InvalidPrefix(String),

    /// The path was never registered on this device
    #[error("Pathpoint not found: {0}")]
    NotFound(String),

    /// A pathpoint with the same prefixed path is already registered
    #[error("Pathpoint already registered: {0}")]
    AlreadyRegistered(String),

    /// Registration was already closed and the synchronizer started
    #[error("Registration already completed for device {0}")]
    DoubleCompletion(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
