//! Longshot Persistence - Local pathpoint state
//!
//! Backends for the `IPersistenceLayer` port from `longshot-core`:
//! - [`MemoryPersistence`] - in-process map, lost on exit
//! - [`FilePersistence`] - JSON file, durable after each `flush`
//!
//! ## Architecture
//!
//! This crate is a driven (secondary) adapter in the hexagonal architecture.
//! The device keeps one `Arc<dyn IPersistenceLayer>` and hands it to every
//! pathpoint it builds.
//!
//! ## Usage
//!
//! ```no_run
//! use longshot_core::config::Config;
//! use longshot_persistence::open_backend;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = Config::load_or_default(&Config::default_path());
//! let persistence = open_backend(&config.persistence)?;
//! // Pass persistence to Device::with_persistence...
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use longshot_core::config::PersistenceConfig;
use longshot_core::ports::{IPersistenceLayer, NoPersistence};

pub mod file;
pub mod memory;

pub use file::FilePersistence;
pub use memory::MemoryPersistence;

/// Errors that can occur in the persistence backends
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Reading or writing the data file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The data file does not hold a valid pathpoint map
    #[error("Corrupt data file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured backend name is not known
    #[error("Unknown persistence backend: {0}")]
    UnknownBackend(String),
}

/// Open the backend selected by `config.backend`
///
/// # Errors
/// Fails for an unknown backend name or an unreadable data file.
pub fn open_backend(config: &PersistenceConfig) -> anyhow::Result<Arc<dyn IPersistenceLayer>> {
    let backend: Arc<dyn IPersistenceLayer> = match config.backend.as_str() {
        "none" => Arc::new(NoPersistence),
        "memory" => Arc::new(MemoryPersistence::new()),
        "file" => Arc::new(FilePersistence::open(&config.file)?),
        other => return Err(PersistenceError::UnknownBackend(other.to_string()).into()),
    };
    tracing::debug!(backend = %config.backend, "Opened persistence backend");
    Ok(backend)
}
