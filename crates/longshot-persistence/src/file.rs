//! JSON file persistence backend
//!
//! The whole map is loaded when the file is opened and kept in memory.
//! `set` and `delete` only touch the in-memory copy; `flush` writes the map
//! to a sibling temporary file and renames it over the data file, so the file
//! on disk always holds a complete snapshot.
//!
//! File layout:
//!
//! ```json
//! { "version": 1, "values": { "Wtemp": { "timestamp": 12.5, "value": 21 } } }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use longshot_core::domain::{Sample, Timestamp};
use longshot_core::ports::{IPersistenceLayer, StoredValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::PersistenceError;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    version: u32,
    #[serde(default)]
    values: BTreeMap<String, Sample>,
}

#[derive(Debug, Default)]
struct Inner {
    values: BTreeMap<String, Sample>,
    dirty: bool,
}

/// [`IPersistenceLayer`] backed by a single JSON file
#[derive(Debug)]
pub struct FilePersistence {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl FilePersistence {
    /// Open (or prepare to create) the data file at `path`
    ///
    /// A missing file is an empty store; the file and its parent directory
    /// are created on the first flush that has something to write.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let values = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| PersistenceError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let data: DataFile =
                serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
                    path: path.display().to_string(),
                    source,
                })?;
            data.values
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), paths = values.len(), "Opened pathpoint data file");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                values,
                dirty: false,
            }),
        })
    }

    /// Location of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are writes not yet flushed to disk
    pub fn is_dirty(&self) -> bool {
        self.inner().dirty
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_snapshot(&self, values: &BTreeMap<String, Sample>) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let data = DataFile {
            version: FORMAT_VERSION,
            values: values.clone(),
        };
        let content = serde_json::to_vec_pretty(&data).map_err(|source| {
            PersistenceError::Corrupt {
                path: self.path.display().to_string(),
                source,
            }
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl IPersistenceLayer for FilePersistence {
    fn get(&self, path: &str) -> anyhow::Result<StoredValue> {
        Ok(self.inner().values.get(path).cloned().into())
    }

    fn set(&self, path: &str, value: &Value, timestamp: Timestamp) -> anyhow::Result<()> {
        let mut inner = self.inner();
        inner
            .values
            .insert(path.to_string(), Sample::new(timestamp, value.clone()));
        inner.dirty = true;
        Ok(())
    }

    fn delete(&self, path: &str) -> anyhow::Result<()> {
        let mut inner = self.inner();
        if inner.values.remove(path).is_some() {
            inner.dirty = true;
        }
        Ok(())
    }

    fn flush(&self) -> anyhow::Result<()> {
        let mut inner = self.inner();
        if !inner.dirty {
            return Ok(());
        }
        self.write_snapshot(&inner.values)?;
        inner.dirty = false;
        debug!(path = %self.path.display(), paths = inner.values.len(), "Flushed pathpoint data file");
        Ok(())
    }
}
