//! Device - the registry of pathpoints for one credentialed identity
//!
//! The device owns the pathpoint map, the prefix applied to every path, the
//! persistence layer, and the bookkeeping the synchronizer needs to know when
//! the path set must be declared again.
//!
//! ## Path-set generations
//!
//! Every register/unregister bumps a generation counter. A declaration
//! captures the generation together with the path snapshot it sends, and the
//! device only counts as synced when the acknowledged generation is still
//! the current one. A registration racing an in-flight declaration therefore
//! forces another round instead of being lost.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::DomainError;
use super::newtypes::{Credentials, DevicePrefix};
use super::pathpoint::{lock, Pathpoint, PathpointBuilder};
use crate::ports::persistence::{IPersistenceLayer, NoPersistence};

#[derive(Debug, Default)]
struct Registry {
    /// Prefixed path -> pathpoint
    pathpoints: BTreeMap<String, Arc<Pathpoint>>,
    generation: u64,
    synced_generation: Option<u64>,
}

impl Registry {
    fn paths_synced(&self) -> bool {
        self.synced_generation == Some(self.generation)
    }
}

/// Consistent view of the registered path set at one generation
#[derive(Debug, Clone)]
pub struct PathSnapshot {
    pub generation: u64,
    pub pathpoints: Vec<Arc<Pathpoint>>,
}

impl PathSnapshot {
    /// Prefixed paths in registry order
    pub fn prefixed_paths(&self) -> Vec<String> {
        self.pathpoints
            .iter()
            .map(|pp| pp.prefixed_path().to_string())
            .collect()
    }
}

/// Registry of pathpoints for one device identity
pub struct Device {
    instance: Uuid,
    credentials: Credentials,
    prefix: DevicePrefix,
    persistence: Arc<dyn IPersistenceLayer>,
    registry: Mutex<Registry>,
    registration_closed: AtomicBool,
}

impl Device {
    /// Creates a device that persists nothing
    pub fn new(credentials: Credentials, prefix: DevicePrefix) -> Self {
        Self::with_persistence(credentials, prefix, Arc::new(NoPersistence))
    }

    pub fn with_persistence(
        credentials: Credentials,
        prefix: DevicePrefix,
        persistence: Arc<dyn IPersistenceLayer>,
    ) -> Self {
        Self {
            instance: Uuid::new_v4(),
            credentials,
            prefix,
            persistence,
            registry: Mutex::new(Registry::default()),
            registration_closed: AtomicBool::new(false),
        }
    }

    /// Identity of this device object, distinct for every instance
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn device_id(&self) -> &str {
        &self.credentials.device_id
    }

    pub fn prefix(&self) -> DevicePrefix {
        self.prefix
    }

    pub fn persistence(&self) -> &Arc<dyn IPersistenceLayer> {
        &self.persistence
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Starts building a pathpoint for this device
    pub fn pathpoint(&self, path: impl Into<String>) -> PathpointBuilder {
        PathpointBuilder::new(path)
    }

    /// Builds a plain pathpoint for `path` and registers it
    pub fn register_path(&self, path: impl Into<String>) -> Result<Arc<Pathpoint>, DomainError> {
        let pathpoint = Pathpoint::new(path, self)?;
        self.register(pathpoint)
    }

    /// Inserts a pathpoint under its prefixed path
    ///
    /// # Errors
    /// - [`DomainError::AlreadyRegistered`] if the prefixed path is taken
    /// - [`DomainError::ValidationFailed`] if the pathpoint was built for
    ///   another device
    pub fn register(&self, pathpoint: Pathpoint) -> Result<Arc<Pathpoint>, DomainError> {
        if !self.owns(&pathpoint) {
            return Err(DomainError::ValidationFailed(format!(
                "pathpoint {} belongs to another device",
                pathpoint.prefixed_path()
            )));
        }

        let mut registry = lock(&self.registry);
        if registry.pathpoints.contains_key(pathpoint.prefixed_path()) {
            return Err(DomainError::AlreadyRegistered(
                pathpoint.prefixed_path().to_string(),
            ));
        }

        let pathpoint = Arc::new(pathpoint);
        registry
            .pathpoints
            .insert(pathpoint.prefixed_path().to_string(), Arc::clone(&pathpoint));
        registry.generation += 1;

        info!(
            device_id = %self.credentials.device_id,
            path = %pathpoint.prefixed_path(),
            generation = registry.generation,
            "Pathpoint registered"
        );
        Ok(pathpoint)
    }

    /// Removes the pathpoint registered under `prefixed_path` and forgets its
    /// persisted value
    ///
    /// # Errors
    /// Returns [`DomainError::NotFound`] if nothing is registered there.
    pub fn unregister(&self, prefixed_path: &str) -> Result<Arc<Pathpoint>, DomainError> {
        let pathpoint = {
            let mut registry = lock(&self.registry);
            let pathpoint = registry
                .pathpoints
                .remove(prefixed_path)
                .ok_or_else(|| DomainError::NotFound(prefixed_path.to_string()))?;
            registry.generation += 1;
            pathpoint
        };

        if let Err(err) = self.persistence.delete(pathpoint.path()) {
            warn!(path = %pathpoint.path(), error = %err, "Failed to delete persisted value");
        }

        info!(
            device_id = %self.credentials.device_id,
            path = %prefixed_path,
            "Pathpoint unregistered"
        );
        Ok(pathpoint)
    }

    /// Removes `pathpoint` from this device
    pub fn unregister_pathpoint(&self, pathpoint: &Pathpoint) -> Result<(), DomainError> {
        if !self.owns(pathpoint) {
            return Err(DomainError::NotFound(pathpoint.prefixed_path().to_string()));
        }
        self.unregister(pathpoint.prefixed_path()).map(|_| ())
    }

    /// Looks up a pathpoint by its **unprefixed** path
    pub fn get(&self, path: &str) -> Result<Arc<Pathpoint>, DomainError> {
        let prefixed = self.prefix.apply(path)?;
        self.get_prefixed(&prefixed)
            .ok_or_else(|| DomainError::NotFound(path.to_string()))
    }

    /// Looks up a pathpoint by its prefixed (remote-facing) path
    pub fn get_prefixed(&self, prefixed_path: &str) -> Option<Arc<Pathpoint>> {
        lock(&self.registry).pathpoints.get(prefixed_path).cloned()
    }

    /// Snapshot of every registered pathpoint
    pub fn pathpoints(&self) -> Vec<Arc<Pathpoint>> {
        lock(&self.registry).pathpoints.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).pathpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.registry).pathpoints.is_empty()
    }

    fn owns(&self, pathpoint: &Pathpoint) -> bool {
        pathpoint.device_instance() == self.instance
    }

    // ------------------------------------------------------------------------
    // Declaration bookkeeping
    // ------------------------------------------------------------------------

    /// Whether the current path set has been acknowledged by the server
    pub fn paths_synced(&self) -> bool {
        lock(&self.registry).paths_synced()
    }

    /// The path set to declare, tagged with its generation
    pub fn path_snapshot(&self) -> PathSnapshot {
        let registry = lock(&self.registry);
        PathSnapshot {
            generation: registry.generation,
            pathpoints: registry.pathpoints.values().cloned().collect(),
        }
    }

    /// Records that the server acknowledged the path set at `generation`
    ///
    /// Returns whether that is still the current path set.
    pub fn mark_paths_synced(&self, generation: u64) -> bool {
        let mut registry = lock(&self.registry);
        registry.synced_generation = Some(generation);
        let synced = registry.paths_synced();
        if !synced {
            debug!(
                acknowledged = generation,
                current = registry.generation,
                "Path set changed during declaration"
            );
        }
        synced
    }

    // ------------------------------------------------------------------------
    // Registration completion
    // ------------------------------------------------------------------------

    /// One-shot transition closing the initial registration phase
    ///
    /// Pathpoints can still be registered afterwards; they are declared on
    /// the next cycle.
    ///
    /// # Errors
    /// Returns [`DomainError::DoubleCompletion`] on every call after the first.
    pub fn complete_registration(&self) -> Result<(), DomainError> {
        if self
            .registration_closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(device_id = %self.credentials.device_id, "Registration completed twice");
            return Err(DomainError::DoubleCompletion(
                self.credentials.device_id.clone(),
            ));
        }

        info!(
            device_id = %self.credentials.device_id,
            pathpoints = self.len(),
            "Registration completed"
        );
        Ok(())
    }

    pub fn is_registration_closed(&self) -> bool {
        self.registration_closed.load(Ordering::Acquire)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.instance == other.instance
    }
}

impl Eq for Device {}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("credentials", &self.credentials)
            .field("prefix", &self.prefix)
            .field("pathpoints", &self.len())
            .field("paths_synced", &self.paths_synced())
            .field("registration_closed", &self.is_registration_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::newtypes::{Sample, Timestamp};
    use crate::ports::persistence::StoredValue;

    fn device() -> Device {
        Device::new(Credentials::new("dev", "secret"), DevicePrefix::new('l'))
    }

    struct RecordingPersistence {
        deleted: Mutex<Vec<String>>,
    }

    impl IPersistenceLayer for RecordingPersistence {
        fn get(&self, _path: &str) -> anyhow::Result<StoredValue> {
            Ok(StoredValue::Absent)
        }

        fn set(&self, _: &str, _: &serde_json::Value, _: Timestamp) -> anyhow::Result<()> {
            Ok(())
        }

        fn delete(&self, path: &str) -> anyhow::Result<()> {
            lock(&self.deleted).push(path.to_string());
            Ok(())
        }

        fn flush(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_get_unregister() {
        let device = device();
        let pp = device.register_path("Wtemp").unwrap();
        assert_eq!(pp.prefixed_path(), "Wltemp");

        let found = device.get("Wtemp").unwrap();
        assert!(Arc::ptr_eq(&pp, &found));

        device.unregister("Wltemp").unwrap();
        assert_eq!(
            device.get("Wtemp").unwrap_err(),
            DomainError::NotFound("Wtemp".to_string())
        );
    }

    #[test]
    fn test_register_twice_fails() {
        let device = device();
        device.register_path("Wtemp").unwrap();
        let err = device.register_path("Wtemp").unwrap_err();
        assert_eq!(err, DomainError::AlreadyRegistered("Wltemp".to_string()));
        assert_eq!(device.len(), 1);
    }

    #[test]
    fn test_register_foreign_pathpoint_fails() {
        let d1 = device();
        let d2 = device();
        let pp = Pathpoint::new("Wtemp", &d2).unwrap();
        assert!(matches!(
            d1.register(pp),
            Err(DomainError::ValidationFailed(_))
        ));
        assert!(d1.is_empty());
    }

    #[test]
    fn test_unregister_unknown_fails() {
        let device = device();
        assert_eq!(
            device.unregister("Wlnope").unwrap_err(),
            DomainError::NotFound("Wlnope".to_string())
        );
    }

    #[test]
    fn test_unregister_pathpoint() {
        let device = device();
        let pp = device.register_path("Wtemp").unwrap();
        device.unregister_pathpoint(&pp).unwrap();
        assert!(device.is_empty());
        assert!(device.unregister_pathpoint(&pp).is_err());
    }

    #[test]
    fn test_unregister_deletes_unprefixed_persisted_value() {
        let persistence = Arc::new(RecordingPersistence {
            deleted: Mutex::new(Vec::new()),
        });
        let device = Device::with_persistence(
            Credentials::new("dev", "secret"),
            DevicePrefix::new('l'),
            Arc::clone(&persistence) as Arc<dyn IPersistenceLayer>,
        );
        device.register_path("Wtemp").unwrap();
        device.unregister("Wltemp").unwrap();
        assert_eq!(*lock(&persistence.deleted), vec!["Wtemp".to_string()]);
    }

    #[test]
    fn test_registry_changes_require_redeclaration() {
        let device = device();
        assert!(!device.paths_synced());

        device.register_path("Wtemp").unwrap();
        let snapshot = device.path_snapshot();
        assert!(device.mark_paths_synced(snapshot.generation));
        assert!(device.paths_synced());

        device.register_path("Whum").unwrap();
        assert!(!device.paths_synced());

        let snapshot = device.path_snapshot();
        device.mark_paths_synced(snapshot.generation);
        device.unregister("Wlhum").unwrap();
        assert!(!device.paths_synced());
    }

    #[test]
    fn test_registration_during_declaration_is_not_lost() {
        let device = device();
        device.register_path("Wtemp").unwrap();
        let snapshot = device.path_snapshot();

        // Registered while the declaration request is in flight
        device.register_path("Whum").unwrap();

        assert!(!device.mark_paths_synced(snapshot.generation));
        assert!(!device.paths_synced());
    }

    #[test]
    fn test_snapshot_lists_prefixed_paths() {
        let device = device();
        device.register_path("Wtemp").unwrap();
        device.register_path("Ahum").unwrap();
        let mut paths = device.path_snapshot().prefixed_paths();
        paths.sort();
        assert_eq!(paths, vec!["Alhum".to_string(), "Wltemp".to_string()]);
    }

    #[test]
    fn test_complete_registration_once() {
        let device = device();
        assert!(!device.is_registration_closed());
        device.complete_registration().unwrap();
        assert!(device.is_registration_closed());
        assert_eq!(
            device.complete_registration().unwrap_err(),
            DomainError::DoubleCompletion("dev".to_string())
        );
    }

    #[test]
    fn test_pathpoint_builder_through_device() {
        let device = device();
        let pp = device
            .pathpoint("Wtemp")
            .default_value(json!(1))
            .default_timestamp(Timestamp::from_secs(1.0))
            .build(&device)
            .unwrap();
        let pp = device.register(pp).unwrap();
        assert_eq!(pp.get(), Some(Sample::new(Timestamp::from_secs(1.0), json!(1))));
    }
}
