//! A device exposing the local time as two pathpoints
//!
//! `Whour` and `Wminute` are stored once a minute; the background
//! synchronizer archives and uploads them. Ctrl-C shuts down cleanly.
//!
//! ```text
//! cargo run -p longshot-sync --example currenttime [config.yaml]
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Timelike;
use longshot_api::LongshotClient;
use longshot_core::config::Config;
use longshot_core::domain::{Device, DevicePrefix};
use longshot_sync::DeviceRuntime;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&config_path);
    if config.device.device_id.is_empty() {
        config.device.device_id = "long1".into();
        config.device.secret = "long1".into();
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let errors = config.validate();
    if !errors.is_empty() {
        for err in &errors {
            error!(%err, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path.display());
    }

    let prefix = config.device.prefix().unwrap_or_else(DevicePrefix::default);
    let persistence = longshot_persistence::open_backend(&config.persistence)?;
    let device = Arc::new(Device::with_persistence(
        config.device.credentials(),
        prefix,
        persistence,
    ));

    let hour = device.register_path("Whour")?;
    let minute = device.register_path("Wminute")?;

    let api = LongshotClient::new(&config.api).context("Failed to build API client")?;
    let runtime = DeviceRuntime::new(Arc::clone(&device), Arc::new(api), config.sync.clone());
    runtime.done()?;

    info!(
        device_id = %device.device_id(),
        hour = %hour.prefixed_path(),
        minute = %minute.prefixed_path(),
        "Publishing local time"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = chrono::Local::now();
                hour.store(json!(now.hour()));
                minute.store(json!(now.minute()));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    runtime.shutdown().await;
    Ok(())
}
