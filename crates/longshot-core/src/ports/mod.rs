//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The domain core depends on them; their
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteApi`] - Request/response contract with the telemetry server
//! - [`IPersistenceLayer`] - Durable `path -> (timestamp, value)` store

pub mod persistence;
pub mod remote_api;

pub use persistence::{IPersistenceLayer, NoPersistence, StoredValue};
pub use remote_api::{
    DeclareResponse, IRemoteApi, OrderAck, Orders, WireSample, WireValues,
};
