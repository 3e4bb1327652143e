//! Pathpoint - a single named, timestamped value
//!
//! A [`Pathpoint`] holds the current `(timestamp, value)` known for one path,
//! the queue of samples awaiting upload, and the listeners interested in
//! changes of the current value.
//!
//! ## Write channels
//!
//! | Operation              | Current value     | Pending sample | Listeners |
//! |------------------------|-------------------|----------------|-----------|
//! | [`store`]              | untouched         | yes            | no        |
//! | [`update`]             | change rule       | yes            | on change |
//! | [`on_write_arrived`]   | change rule       | no             | on change |
//!
//! The change rule rejects a write whose timestamp is older than the one
//! currently held. An absent current timestamp compares below everything.
//!
//! [`store`]: Pathpoint::store
//! [`update`]: Pathpoint::update
//! [`on_write_arrived`]: Pathpoint::on_write_arrived

use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::device::Device;
use super::errors::DomainError;
use super::newtypes::{Sample, Timestamp};
use crate::ports::persistence::{IPersistenceLayer, StoredValue};

/// Callback invoked with the new current value of a pathpoint
pub type Listener = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// PathpointHandler capability
// ============================================================================

/// Application hooks for server-originated orders
///
/// Both methods are called from the synchronizer task and must not block.
pub trait PathpointHandler: Send + Sync {
    /// A server write was accepted by the change rule
    fn on_write_arrived(&self, _timestamp: Timestamp, _value: &Value) {}

    /// The server asked for a fresh reading
    ///
    /// `current` is the value held by the pathpoint. Returning `None` means
    /// nothing could be obtained and no sample is queued.
    fn obtain_value(&self, _current: Option<&Value>) -> Option<Value> {
        None
    }
}

/// Handler that ignores writes and never answers reads
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl PathpointHandler for NullHandler {}

type WriteFn = Box<dyn Fn(Timestamp, &Value) + Send + Sync>;
type ReadFn = Box<dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync>;

/// Adapter turning two plain closures into a [`PathpointHandler`]
///
/// ```
/// use longshot_core::domain::FnHandler;
/// use serde_json::json;
///
/// let handler = FnHandler::new()
///     .on_write(|ts, value| println!("server set {value} at {ts}"))
///     .on_read(|| Some(json!(21.5)));
/// ```
pub struct FnHandler {
    on_write: WriteFn,
    on_read: ReadFn,
}

impl FnHandler {
    pub fn new() -> Self {
        Self {
            on_write: Box::new(|_, _| {}),
            on_read: Box::new(|_| None),
        }
    }

    pub fn on_write<F>(mut self, f: F) -> Self
    where
        F: Fn(Timestamp, &Value) + Send + Sync + 'static,
    {
        self.on_write = Box::new(f);
        self
    }

    pub fn on_read<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Option<Value> + Send + Sync + 'static,
    {
        self.on_read = Box::new(move |_| f());
        self
    }

    /// Answer read requests with the pathpoint's current value
    pub fn echo_current(mut self) -> Self {
        self.on_read = Box::new(|current| current.cloned());
        self
    }
}

impl Default for FnHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PathpointHandler for FnHandler {
    fn on_write_arrived(&self, timestamp: Timestamp, value: &Value) {
        (self.on_write)(timestamp, value)
    }

    fn obtain_value(&self, current: Option<&Value>) -> Option<Value> {
        (self.on_read)(current)
    }
}

// ============================================================================
// Declaration outcome
// ============================================================================

/// What happened when a pathpoint was reconciled against a declaration answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareOutcome {
    /// The pathpoint was declared in an earlier round; nothing was compared
    AlreadyDeclared,
    /// The server value was newer (or the pathpoint had none) and was applied
    RemoteAccepted,
    /// The local value was newer and was queued for upload
    LocalQueued,
    /// Neither side had a value
    Empty,
}

// ============================================================================
// Pathpoint
// ============================================================================

#[derive(Debug, Default)]
struct PathpointState {
    value: Option<Value>,
    timestamp: Option<Timestamp>,
    pending: Vec<Sample>,
    needs_sync: bool,
    declared: bool,
}

impl PathpointState {
    fn current(&self) -> Option<Sample> {
        match (&self.value, self.timestamp) {
            (Some(value), Some(timestamp)) => Some(Sample::new(timestamp, value.clone())),
            _ => None,
        }
    }

    fn queue(&mut self, sample: Sample) {
        self.pending.push(sample);
        self.needs_sync = true;
    }
}

/// A single named value exchanged between the device and the server
///
/// Safe to share between application threads and the synchronizer; all
/// mutable state sits behind a mutex that is never held while listeners or
/// handlers run.
pub struct Pathpoint {
    path: String,
    prefixed_path: String,
    device_instance: Uuid,
    persistence: Arc<dyn IPersistenceLayer>,
    handler: Box<dyn PathpointHandler>,
    state: Mutex<PathpointState>,
    listeners: Mutex<Vec<Listener>>,
}

impl Pathpoint {
    /// Starts building a pathpoint for the unprefixed `path`
    pub fn builder(path: impl Into<String>) -> PathpointBuilder {
        PathpointBuilder::new(path)
    }

    /// Creates a pathpoint with no defaults and a [`NullHandler`]
    pub fn new(path: impl Into<String>, device: &Device) -> Result<Self, DomainError> {
        PathpointBuilder::new(path).build(device)
    }

    /// Unprefixed path, used for persistence lookups
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path with the device prefix, used as the remote-facing key
    pub fn prefixed_path(&self) -> &str {
        &self.prefixed_path
    }

    pub(crate) fn device_instance(&self) -> Uuid {
        self.device_instance
    }

    pub fn value(&self) -> Option<Value> {
        lock(&self.state).value.clone()
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        lock(&self.state).timestamp
    }

    /// The current `(timestamp, value)`, if both are known
    pub fn get(&self) -> Option<Sample> {
        lock(&self.state).current()
    }

    pub fn needs_sync(&self) -> bool {
        lock(&self.state).needs_sync
    }

    pub fn is_declared(&self) -> bool {
        lock(&self.state).declared
    }

    pub fn pending_samples(&self) -> Vec<Sample> {
        lock(&self.state).pending.clone()
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Registers a listener; listeners run in registration order
    ///
    /// Listeners run on whichever thread applied the write, outside any
    /// lock. A write already superseded by a newer one when its listeners
    /// would run is not announced. Concurrent writers can still interleave
    /// their notifications, so a listener needing the latest value should
    /// read [`get`](Self::get) rather than rely on call order.
    pub fn listen<F>(&self, listener: F) -> &Self
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        lock(&self.listeners).push(Arc::new(listener));
        self
    }

    // ------------------------------------------------------------------------
    // Application-facing writes
    // ------------------------------------------------------------------------

    /// Queues `value` stamped with the current time for upload
    pub fn store(&self, value: Value) {
        self.store_at(value, Timestamp::now());
    }

    /// Queues `(timestamp, value)` for upload and persists it locally
    ///
    /// The current value is not advanced and listeners are not invoked.
    pub fn store_at(&self, value: Value, timestamp: Timestamp) {
        let mut state = lock(&self.state);
        self.persist(&value, timestamp);
        state.queue(Sample::new(timestamp, value));
        trace!(path = %self.prefixed_path, %timestamp, "Sample stored");
    }

    /// Notifies the pathpoint of a change observed inside the process
    pub fn update(&self, value: Value) {
        self.update_at(value, Timestamp::now());
    }

    /// Applies the change rule and queues the observation for upload
    pub fn update_at(&self, value: Value, timestamp: Timestamp) {
        self.change(timestamp, value, true);
    }

    // ------------------------------------------------------------------------
    // Synchronizer-facing operations
    // ------------------------------------------------------------------------

    /// Applies a server-originated write
    ///
    /// Nothing is queued for upload; the server already knows the value.
    /// Returns whether the write was accepted.
    pub fn on_write_arrived(&self, timestamp: Timestamp, value: Value) -> bool {
        let accepted = self.change(timestamp, value.clone(), false);
        if accepted {
            self.handler.on_write_arrived(timestamp, &value);
        }
        accepted
    }

    /// Asks the handler for a fresh reading; must not block
    pub fn obtain_value(&self) -> Option<Value> {
        let current = self.value();
        self.handler.obtain_value(current.as_ref())
    }

    /// Appends a sample to the upload queue without touching the current value
    pub fn queue_sample(&self, sample: Sample) {
        lock(&self.state).queue(sample);
    }

    /// Removes and returns every pending sample
    pub fn take_pending(&self) -> Vec<Sample> {
        std::mem::take(&mut lock(&self.state).pending)
    }

    /// Puts samples back after a failed upload, ahead of anything queued since
    pub fn requeue(&self, samples: Vec<Sample>) {
        if samples.is_empty() {
            return;
        }
        let mut state = lock(&self.state);
        let newer = std::mem::replace(&mut state.pending, samples);
        state.pending.extend(newer);
        state.needs_sync = true;
    }

    /// Records a successful upload
    ///
    /// Samples queued while the upload was in flight keep `needs_sync` set.
    pub fn mark_uploaded(&self) {
        let mut state = lock(&self.state);
        state.needs_sync = !state.pending.is_empty();
    }

    /// Reconciles this pathpoint with the value the server returned on
    /// declaration, once per pathpoint lifetime
    ///
    /// With no local value the server value wins unconditionally. Otherwise
    /// the newer of the two wins; when the local value wins it is queued for
    /// upload instead of mutating anything, unless it is already pending.
    pub fn resolve_declaration(&self, remote: Option<Sample>) -> DeclareOutcome {
        let local = {
            let state = lock(&self.state);
            if state.declared {
                return DeclareOutcome::AlreadyDeclared;
            }
            state.current()
        };

        let outcome = match (remote, local) {
            (Some(remote), None) => {
                self.on_write_arrived(remote.timestamp, remote.value);
                DeclareOutcome::RemoteAccepted
            }
            (Some(remote), Some(local)) if remote.timestamp > local.timestamp => {
                self.on_write_arrived(remote.timestamp, remote.value);
                DeclareOutcome::RemoteAccepted
            }
            (_, Some(local)) => {
                let mut state = lock(&self.state);
                if !state.pending.contains(&local) {
                    state.queue(local);
                }
                DeclareOutcome::LocalQueued
            }
            (None, None) => DeclareOutcome::Empty,
        };

        lock(&self.state).declared = true;
        debug!(path = %self.prefixed_path, ?outcome, "Pathpoint declared");
        outcome
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// The change rule: stale writes are discarded, accepted writes become
    /// the current value, are persisted, and are announced to listeners
    ///
    /// With `queue_for_upload` the sample is queued under the same lock,
    /// whether or not it was accepted.
    fn change(&self, timestamp: Timestamp, value: Value, queue_for_upload: bool) -> bool {
        {
            let mut state = lock(&self.state);
            if queue_for_upload {
                state.queue(Sample::new(timestamp, value.clone()));
            }
            if Some(timestamp) < state.timestamp {
                debug!(
                    path = %self.prefixed_path,
                    %timestamp,
                    current = ?state.timestamp,
                    "Stale write discarded"
                );
                return false;
            }
            self.persist(&value, timestamp);
            state.value = Some(value.clone());
            state.timestamp = Some(timestamp);
        }

        if lock(&self.state).timestamp != Some(timestamp) {
            debug!(path = %self.prefixed_path, %timestamp, "Superseded write not announced");
            return true;
        }
        self.notify_listeners(&value);
        true
    }

    fn notify_listeners(&self, value: &Value) {
        let listeners: Vec<Listener> = lock(&self.listeners).clone();
        for (index, listener) in listeners.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener(value))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(path = %self.prefixed_path, index, error = %err, "Listener failed");
                }
                Err(_) => {
                    warn!(path = %self.prefixed_path, index, "Listener panicked");
                }
            }
        }
    }

    fn persist(&self, value: &Value, timestamp: Timestamp) {
        if let Err(err) = self.persistence.set(&self.path, value, timestamp) {
            warn!(path = %self.path, error = %err, "Failed to persist pathpoint value");
        }
    }
}

impl PartialEq for Pathpoint {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.device_instance == other.device_instance
    }
}

impl Eq for Pathpoint {}

impl Hash for Pathpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.device_instance.hash(state);
    }
}

impl fmt::Debug for Pathpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Pathpoint")
            .field("prefixed_path", &self.prefixed_path)
            .field("value", &state.value)
            .field("timestamp", &state.timestamp)
            .field("pending", &state.pending.len())
            .field("declared", &state.declared)
            .finish()
    }
}

// ============================================================================
// PathpointBuilder
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum DefaultTimestamp {
    Unset,
    Now,
    At(Timestamp),
}

/// Builder for [`Pathpoint`]
///
/// The initial state is whichever of the persisted value and the supplied
/// default has the strictly greater timestamp. A default timestamp of "now"
/// is resolved before the comparison.
pub struct PathpointBuilder {
    path: String,
    default_value: Option<Value>,
    default_timestamp: DefaultTimestamp,
    handler: Option<Box<dyn PathpointHandler>>,
}

impl PathpointBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_value: None,
            default_timestamp: DefaultTimestamp::Unset,
            handler: None,
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn default_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.default_timestamp = DefaultTimestamp::At(timestamp);
        self
    }

    /// Stamp the default value with the construction time
    pub fn default_now(mut self) -> Self {
        self.default_timestamp = DefaultTimestamp::Now;
        self
    }

    pub fn handler(mut self, handler: impl PathpointHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Builds the pathpoint against `device` without registering it
    pub fn build(self, device: &Device) -> Result<Pathpoint, DomainError> {
        let prefixed_path = device.prefix().apply(&self.path)?;
        let persistence = Arc::clone(device.persistence());

        let default_timestamp = match self.default_timestamp {
            DefaultTimestamp::Unset => None,
            DefaultTimestamp::Now => Some(Timestamp::now()),
            DefaultTimestamp::At(timestamp) => Some(timestamp),
        };

        let stored = match persistence.get(&self.path) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(path = %self.path, error = %err, "Persistence lookup failed, using defaults");
                StoredValue::Absent
            }
        };

        let (value, timestamp) = match stored {
            StoredValue::Present(sample) if Some(sample.timestamp) > default_timestamp => {
                (Some(sample.value), Some(sample.timestamp))
            }
            _ => (self.default_value, default_timestamp),
        };

        Ok(Pathpoint {
            path: self.path,
            prefixed_path,
            device_instance: device.instance_id(),
            persistence,
            handler: self.handler.unwrap_or_else(|| Box::new(NullHandler)),
            state: Mutex::new(PathpointState {
                value,
                timestamp,
                ..PathpointState::default()
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }
}
