//! Background task lifecycle
//!
//! A [`DeviceRuntime`] couples a [`Device`] with the remote API and owns the
//! single background task that drives the [`Synchronizer`]. The task is
//! started once by [`done`](DeviceRuntime::done) and stopped by
//! [`shutdown`](DeviceRuntime::shutdown).
//!
//! ## Loop
//!
//! ```text
//! done() ──→ declare ──(fail)──→ backoff ×2 (capped) ──→ declare ...
//!               │
//!             (ok)
//!               ▼
//!           run_cycle ──→ sleep(interval) ──→ run_cycle ...
//!
//! shutdown() cancels the token; the task leaves at the next sleep,
//! flushes persistence and is joined.
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use longshot_core::config::SyncConfig;
use longshot_core::domain::Device;
use longshot_core::ports::IRemoteApi;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Synchronizer;
use crate::SyncError;

/// Owner of a device's background synchronizer
pub struct DeviceRuntime {
    synchronizer: Arc<Synchronizer>,
    config: SyncConfig,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceRuntime {
    pub fn new(device: Arc<Device>, api: Arc<dyn IRemoteApi>, config: SyncConfig) -> Self {
        Self {
            synchronizer: Arc::new(Synchronizer::new(device, api)),
            config,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        self.synchronizer.device()
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    /// Whether the background task has been started and not yet joined
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Closes registration and starts the background task
    ///
    /// Must be called from within a Tokio runtime. Pathpoints registered
    /// later are declared on the next cycle.
    ///
    /// # Errors
    /// - [`SyncError::Domain`] wrapping `DoubleCompletion` on any call after
    ///   the first; the running task is left untouched
    /// - [`SyncError::NoRuntime`] outside a Tokio runtime; registration stays
    ///   open so a later call can succeed
    /// - [`SyncError::ShutDown`] once [`shutdown`](Self::shutdown) was called
    pub fn done(&self) -> Result<(), SyncError> {
        if self.shutdown.is_cancelled() {
            warn!(device_id = %self.device().device_id(), "done() called after shutdown");
            return Err(SyncError::ShutDown(self.device().device_id().to_string()));
        }
        let handle = Handle::try_current()?;
        self.device().complete_registration()?;

        let task = handle.spawn(run_loop(
            Arc::clone(&self.synchronizer),
            self.config.clone(),
            self.shutdown.clone(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    /// Stops the background task at its next loop boundary and waits for it
    ///
    /// After this returns no further remote calls or persistence flushes are
    /// made. Calling it when the task never started, or twice, is harmless.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(task) = task {
            if let Err(err) = task.await {
                error!(error = %err, "Synchronizer task failed");
            }
        }
        info!(device_id = %self.device().device_id(), "Device runtime shut down");
    }
}

impl Drop for DeviceRuntime {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_loop(synchronizer: Arc<Synchronizer>, config: SyncConfig, shutdown: CancellationToken) {
    info!(
        device_id = %synchronizer.device().device_id(),
        interval_secs = config.interval_secs,
        "Synchronizer starting"
    );

    if initial_declaration(&synchronizer, &config, &shutdown).await {
        loop {
            synchronizer.run_cycle().await;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = tokio::time::sleep(config.interval()) => {}
            }
        }
    } else {
        info!("Shutdown signal received before the first declaration");
    }

    if let Err(err) = synchronizer.flush_persistence() {
        warn!(error = %format!("{err:#}"), "Final persistence flush failed");
    }
    info!("Synchronizer stopped");
}

/// Retries the first declaration with exponential backoff
///
/// Returns `false` if shutdown was requested before it succeeded.
async fn initial_declaration(
    synchronizer: &Synchronizer,
    config: &SyncConfig,
    shutdown: &CancellationToken,
) -> bool {
    let mut backoff = config.declare_backoff();

    loop {
        if shutdown.is_cancelled() {
            return false;
        }

        match synchronizer.declare_paths().await {
            Ok(_) => {
                debug!("Initial declaration succeeded");
                return true;
            }
            Err(err) => {
                warn!(
                    error = %format!("{err:#}"),
                    retry_in_secs = backoff.as_secs(),
                    "Initial path declaration failed"
                );
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return false,
            _ = tokio::time::sleep(backoff) => {}
        }

        backoff = next_backoff(backoff, config.max_declare_backoff());
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
