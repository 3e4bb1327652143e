//! Synchronization engine
//!
//! One [`Synchronizer::run_cycle`] performs, in order:
//!
//! 1. **Declare** the path set, if it changed since the last acknowledged
//!    declaration, and reconcile each new pathpoint with the server value
//! 2. **Poll orders**: apply server writes, answer server reads, confirm
//! 3. **Upload** every queued sample in one batch
//! 4. **Flush** the persistence layer
//!
//! A failure in phases 1-3 aborts the remaining network phases of the cycle.
//! The flush always runs. Nothing here sleeps or retries; cadence belongs to
//! the [`DeviceRuntime`](crate::runtime::DeviceRuntime).

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use longshot_core::domain::{Device, Pathpoint, Sample, Timestamp};
use longshot_core::ports::{IRemoteApi, OrderAck, WireSample, WireValues};
use tracing::{debug, info, warn};

// ============================================================================
// CycleReport
// ============================================================================

/// Summary of one synchronization cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Whether the path set was declared during this cycle
    pub declared: bool,
    /// Server writes accepted by the change rule
    pub writes_applied: u32,
    /// Server reads answered with a queued sample
    pub reads_answered: u32,
    /// Samples acknowledged by the server
    pub samples_uploaded: u32,
    /// Errors encountered during the cycle (non-fatal)
    pub errors: Vec<String>,
    /// Wall-clock duration of the cycle in milliseconds
    pub duration_ms: u64,
}

/// Counts from the order phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderStats {
    pub writes_applied: u32,
    pub reads_answered: u32,
}

// ============================================================================
// Synchronizer
// ============================================================================

/// Drives the exchange between one [`Device`] and the remote API
pub struct Synchronizer {
    device: Arc<Device>,
    api: Arc<dyn IRemoteApi>,
}

impl Synchronizer {
    pub fn new(device: Arc<Device>, api: Arc<dyn IRemoteApi>) -> Self {
        Self { device, api }
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Declares the current path set unless the server already has it
    ///
    /// Every pathpoint that was not declared before is reconciled against the
    /// value the server returned for it; a path missing from the answer has
    /// no server value. The device only counts as synced if the path set did
    /// not change while the request was in flight.
    ///
    /// Returns whether a declaration was sent.
    #[tracing::instrument(skip(self), fields(device_id = %self.device.device_id()))]
    pub async fn declare_paths(&self) -> Result<bool> {
        if self.device.paths_synced() {
            return Ok(false);
        }

        let snapshot = self.device.path_snapshot();
        let paths = snapshot.prefixed_paths();
        let mut response = self
            .api
            .declare_paths(self.device.credentials(), self.device.prefix(), &paths)
            .await
            .context("Failed to declare paths")?;

        for pathpoint in &snapshot.pathpoints {
            if !self.is_registered(pathpoint) {
                debug!(path = %pathpoint.prefixed_path(), "Skipping pathpoint unregistered during declaration");
                continue;
            }
            let remote = response
                .values
                .remove(pathpoint.prefixed_path())
                .flatten()
                .map(WireSample::into_sample);
            pathpoint.resolve_declaration(remote);
        }

        let current = self.device.mark_paths_synced(snapshot.generation);
        info!(paths = paths.len(), current, "Path set declared");
        Ok(true)
    }

    /// Fetches pending orders, applies them, and confirms the batch
    ///
    /// Writes go through the change rule without queuing an upload. Reads ask
    /// the pathpoint's handler for a value and queue it stamped with the
    /// current time. Orders naming an unknown path are skipped but still
    /// confirmed as consumed.
    #[tracing::instrument(skip(self), fields(device_id = %self.device.device_id()))]
    pub async fn poll_orders(&self) -> Result<OrderStats> {
        let orders = self
            .api
            .get_orders(self.device.credentials())
            .await
            .context("Failed to fetch orders")?;

        let mut stats = OrderStats::default();
        if orders.is_empty() {
            return Ok(stats);
        }

        let mut processed = Vec::with_capacity(orders.len());

        for (path, wire) in orders.writes {
            match self.device.get_prefixed(&path) {
                Some(pathpoint) => {
                    let sample = wire.into_sample();
                    if pathpoint.on_write_arrived(sample.timestamp, sample.value) {
                        stats.writes_applied += 1;
                    }
                }
                None => debug!(%path, "Write order for unknown path skipped"),
            }
            processed.push(path);
        }

        for path in orders.reads {
            match self.device.get_prefixed(&path) {
                Some(pathpoint) => {
                    if let Some(value) = pathpoint.obtain_value() {
                        pathpoint.queue_sample(Sample::new(Timestamp::now(), value));
                        stats.reads_answered += 1;
                    } else {
                        debug!(%path, "Read order produced no value");
                    }
                }
                None => debug!(%path, "Read order for unknown path skipped"),
            }
            processed.push(path);
        }

        let ack = OrderAck {
            ack_token: orders.ack_token,
            paths_processed: processed,
        };
        self.api
            .confirm_orders(self.device.credentials(), &ack)
            .await
            .context("Failed to confirm orders")?;

        debug!(
            writes = stats.writes_applied,
            reads = stats.reads_answered,
            "Orders processed"
        );
        Ok(stats)
    }

    /// Uploads every pending sample in one batch
    ///
    /// Pending lists are taken before the call. On failure the samples are
    /// put back ahead of anything queued meanwhile; on success every
    /// pathpoint is marked uploaded.
    ///
    /// Returns the number of samples uploaded.
    #[tracing::instrument(skip(self), fields(device_id = %self.device.device_id()))]
    pub async fn upload_values(&self) -> Result<u32> {
        let pathpoints = self.device.pathpoints();

        let mut taken: Vec<(Arc<Pathpoint>, Vec<Sample>)> = Vec::new();
        for pathpoint in &pathpoints {
            let mut samples = pathpoint.take_pending();
            if samples.is_empty() {
                continue;
            }
            samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
            taken.push((Arc::clone(pathpoint), samples));
        }

        if taken.is_empty() {
            return Ok(0);
        }

        let batch: WireValues = taken
            .iter()
            .map(|(pathpoint, samples)| {
                (
                    pathpoint.prefixed_path().to_string(),
                    samples.iter().map(WireSample::from_sample).collect(),
                )
            })
            .collect();
        let count: usize = taken.iter().map(|(_, samples)| samples.len()).sum();

        match self
            .api
            .sync_values(self.device.credentials(), &batch)
            .await
        {
            Ok(()) => {
                for pathpoint in &pathpoints {
                    pathpoint.mark_uploaded();
                }
                debug!(paths = batch.len(), samples = count, "Samples uploaded");
                Ok(u32::try_from(count).unwrap_or(u32::MAX))
            }
            Err(err) => {
                for (pathpoint, samples) in taken {
                    pathpoint.requeue(samples);
                }
                Err(err.context(format!("Failed to upload {count} samples")))
            }
        }
    }

    /// Makes every persisted write durable
    pub fn flush_persistence(&self) -> Result<()> {
        self.device
            .persistence()
            .flush()
            .context("Failed to flush persistence")
    }

    /// Runs one full cycle; never fails, errors land in the report
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::default();

        if let Err(err) = self.network_phases(&mut report).await {
            let message = format!("{err:#}");
            warn!(error = %message, "Sync cycle aborted");
            report.errors.push(message);
        }

        if let Err(err) = self.flush_persistence() {
            let message = format!("{err:#}");
            warn!(error = %message, "Persistence flush failed");
            report.errors.push(message);
        }

        report.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            declared = report.declared,
            writes = report.writes_applied,
            reads = report.reads_answered,
            uploaded = report.samples_uploaded,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Sync cycle completed"
        );

        report
    }

    async fn network_phases(&self, report: &mut CycleReport) -> Result<()> {
        report.declared = self.declare_paths().await?;

        let stats = self.poll_orders().await?;
        report.writes_applied = stats.writes_applied;
        report.reads_answered = stats.reads_answered;

        report.samples_uploaded = self.upload_values().await?;
        Ok(())
    }

    fn is_registered(&self, pathpoint: &Arc<Pathpoint>) -> bool {
        self.device
            .get_prefixed(pathpoint.prefixed_path())
            .is_some_and(|current| Arc::ptr_eq(&current, pathpoint))
    }
}
