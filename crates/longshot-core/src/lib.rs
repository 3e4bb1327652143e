//! Longshot Core - Domain logic for the device-side synchronization agent
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Pathpoint`, `Device`, `Sample`, `Timestamp`
//! - **Port definitions** - Traits for adapters: `IRemoteApi`, `IPersistenceLayer`
//! - **Configuration** - YAML-backed agent settings
//!
//! # Architecture
//!
//! The domain module owns the pathpoint state machine and the stale-write
//! rejection rule. Ports define the remote service contract and the local
//! key-value persistence contract; their implementations live in adapter
//! crates (`longshot-api`, `longshot-persistence`). The background loop that
//! drives both lives in `longshot-sync`.

pub mod config;
pub mod domain;
pub mod ports;
