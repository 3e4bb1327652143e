//! In-memory persistence backend
//!
//! Keeps the last value of every path in a map. Useful for tests and for
//! devices that only need values to survive unregister/register within one
//! process.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use longshot_core::domain::{Sample, Timestamp};
use longshot_core::ports::{IPersistenceLayer, StoredValue};
use serde_json::Value;

/// Process-local [`IPersistenceLayer`]
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    values: Mutex<HashMap<String, Sample>>,
    flushes: Mutex<u64>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths currently stored
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times [`IPersistenceLayer::flush`] was called
    pub fn flush_count(&self) -> u64 {
        *self.flushes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IPersistenceLayer for MemoryPersistence {
    fn get(&self, path: &str) -> anyhow::Result<StoredValue> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(path).cloned().into())
    }

    fn set(&self, path: &str, value: &Value, timestamp: Timestamp) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), Sample::new(timestamp, value.clone()));
        Ok(())
    }

    fn delete(&self, path: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        *self.flushes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
