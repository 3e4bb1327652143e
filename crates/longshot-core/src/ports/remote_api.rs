//! Remote API port (driven/secondary port)
//!
//! The abstract request/response contract the synchronizer issues against the
//! telemetry/control server. Transport and serialization mechanics belong to
//! the adapter (`longshot-api`); this module fixes only the semantics.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific and
//!   are recovered by the synchronizer, never surfaced to the application.
//! - All DTOs here carry **millisecond** timestamps exactly as on the wire.
//!   Conversion to the second-based [`Timestamp`] happens in the synchronizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::newtypes::{Credentials, DevicePrefix, Sample, Timestamp};

// ============================================================================
// Wire DTOs
// ============================================================================

/// A `(timestamp_ms, value)` pair, serialized as a two element array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireSample(pub f64, pub Value);

impl WireSample {
    /// Encode a second-based sample for sending
    pub fn from_sample(sample: &Sample) -> Self {
        Self(sample.timestamp.as_millis(), sample.value.clone())
    }

    /// Decode a received sample into seconds
    pub fn into_sample(self) -> Sample {
        Sample::new(Timestamp::from_millis(self.0), self.1)
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.0
    }
}

/// Upload batch: prefixed path -> samples sorted by timestamp ascending
pub type WireValues = BTreeMap<String, Vec<WireSample>>;

/// Server answer to a path declaration
///
/// A path mapped to `None` (or missing) has no server-side value yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeclareResponse {
    #[serde(default)]
    pub values: BTreeMap<String, Option<WireSample>>,
}

/// Pending commands for this device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Orders {
    /// Values the server wants written, by prefixed path
    #[serde(default)]
    pub writes: BTreeMap<String, WireSample>,
    /// Prefixed paths the server wants a fresh reading of
    #[serde(default)]
    pub reads: Vec<String>,
    /// Token identifying this batch for confirmation
    #[serde(default)]
    pub ack_token: Option<String>,
}

impl Orders {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.reads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len() + self.reads.len()
    }
}

/// Acknowledgement of a consumed [`Orders`] batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub ack_token: Option<String>,
    /// Prefixed paths whose orders were applied or answered
    pub paths_processed: Vec<String>,
}

// ============================================================================
// IRemoteApi trait
// ============================================================================

/// Port trait for the telemetry/control server
///
/// ## Implementation Notes
///
/// - Any non-success outcome must be returned as `Err`; the synchronizer
///   treats every error as a transport failure and retries next cycle.
/// - Implementations must not retry internally beyond what the transport
///   itself does; retry cadence belongs to the synchronizer loop.
#[async_trait::async_trait]
pub trait IRemoteApi: Send + Sync {
    /// Registers the device's current (prefixed) path set
    ///
    /// The server may return its authoritative value for any of the paths.
    async fn declare_paths(
        &self,
        credentials: &Credentials,
        prefix: DevicePrefix,
        paths: &[String],
    ) -> anyhow::Result<DeclareResponse>;

    /// Fetches pending writes and reads
    async fn get_orders(&self, credentials: &Credentials) -> anyhow::Result<Orders>;

    /// Acknowledges a batch returned by [`get_orders`](IRemoteApi::get_orders)
    async fn confirm_orders(&self, credentials: &Credentials, ack: &OrderAck)
        -> anyhow::Result<()>;

    /// Uploads queued historical samples
    async fn sync_values(&self, credentials: &Credentials, values: &WireValues)
        -> anyhow::Result<()>;
}
