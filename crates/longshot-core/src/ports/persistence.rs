//! Persistence layer port (driven/secondary port)
//!
//! A durable key-value mapping from an **unprefixed** path to the last known
//! `(timestamp, value)` of that path. The synchronizer calls [`flush`] once
//! per cycle; adapters may buffer writes until then.
//!
//! ## Design Notes
//!
//! - The trait is synchronous: it is called from application threads inside
//!   `Pathpoint::store`, which must never wait on the network.
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//!
//! [`flush`]: IPersistenceLayer::flush

use crate::domain::newtypes::{Sample, Timestamp};
use serde_json::Value;

/// Result of a persistence lookup
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    /// Nothing was ever stored for the path
    Absent,
    /// The last stored observation
    Present(Sample),
}

impl StoredValue {
    pub fn into_sample(self) -> Option<Sample> {
        match self {
            StoredValue::Absent => None,
            StoredValue::Present(sample) => Some(sample),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, StoredValue::Absent)
    }
}

impl From<Option<Sample>> for StoredValue {
    fn from(sample: Option<Sample>) -> Self {
        match sample {
            Some(sample) => StoredValue::Present(sample),
            None => StoredValue::Absent,
        }
    }
}

/// Port trait for local durable storage of current pathpoint values
pub trait IPersistenceLayer: Send + Sync {
    /// Obtain the last stored value of `path`
    fn get(&self, path: &str) -> anyhow::Result<StoredValue>;

    /// Store the current value of `path`
    fn set(&self, path: &str, value: &Value, timestamp: Timestamp) -> anyhow::Result<()>;

    /// Forget `path`; deleting an unknown path is not an error
    fn delete(&self, path: &str) -> anyhow::Result<()>;

    /// Make all previous writes durable
    fn flush(&self) -> anyhow::Result<()>;
}

/// Persistence layer that remembers nothing
///
/// Every lookup is [`StoredValue::Absent`] and all writes are discarded.
/// This is the default for a [`Device`](crate::domain::Device).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPersistence;

impl IPersistenceLayer for NoPersistence {
    fn get(&self, _path: &str) -> anyhow::Result<StoredValue> {
        Ok(StoredValue::Absent)
    }

    fn set(&self, _path: &str, _value: &Value, _timestamp: Timestamp) -> anyhow::Result<()> {
        Ok(())
    }

    fn delete(&self, _path: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_persistence_forgets_everything() {
        let layer = NoPersistence;
        layer
            .set("Wtemp", &json!(21.5), Timestamp::from_secs(100.0))
            .unwrap();
        assert!(layer.get("Wtemp").unwrap().is_absent());
        layer.delete("Wtemp").unwrap();
        layer.flush().unwrap();
    }

    #[test]
    fn test_stored_value_conversions() {
        let sample = Sample::new(Timestamp::from_secs(1.0), json!("x"));
        let stored = StoredValue::from(Some(sample.clone()));
        assert_eq!(stored.clone().into_sample(), Some(sample));
        assert!(!stored.is_absent());
        assert!(StoredValue::from(None).is_absent());
    }
}
