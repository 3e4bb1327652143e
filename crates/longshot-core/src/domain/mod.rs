//! Domain entities and business logic
//!
//! This module contains the core domain types for Longshot:
//! - Newtypes for timestamps, samples, prefixes and credentials
//! - The pathpoint state machine and its handler capability
//! - The device registry
//! - Domain-specific error types

pub mod device;
pub mod errors;
pub mod newtypes;
pub mod pathpoint;

// Re-export commonly used types
pub use device::{Device, PathSnapshot};
pub use errors::DomainError;
pub use newtypes::*;
pub use pathpoint::{
    DeclareOutcome, FnHandler, Listener, NullHandler, Pathpoint, PathpointBuilder,
    PathpointHandler,
};
