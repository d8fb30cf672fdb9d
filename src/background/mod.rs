pub mod retention;
pub mod sweep;

use std::time::Duration;

use anyhow::Context;
use log::info;
use tokio::sync::broadcast;

use crate::common::errors::handle_error;
use crate::config::APP_CONFIG;
use retention::{RETENTION, current_timestamp_ms};

/// Drive the retention scheduler and the storage sweep until shutdown.
///
/// Both intervals fire immediately on startup, so orphans left behind by a
/// previous process are reclaimed as soon as the service comes back up.
pub async fn run(mut shutdown_rx: broadcast::Receiver<()>) {
    let scheduler = RETENTION.clone();
    let mut cleanup_tick =
        tokio::time::interval(Duration::from_secs(APP_CONFIG.scheduler_tick_secs));
    let mut sweep_tick =
        tokio::time::interval(Duration::from_secs(APP_CONFIG.sweep_interval_secs));

    loop {
        tokio::select! {
            _ = cleanup_tick.tick() => {
                let executed = scheduler.run_due(current_timestamp_ms());
                if executed > 0 {
                    info!("Retention pass executed {} cleanup tasks", executed);
                }
            }
            _ = sweep_tick.tick() => {
                let _ = sweep::sweep_storage_root(
                    &APP_CONFIG.storage_root,
                    APP_CONFIG.retention_delay(),
                    &scheduler,
                )
                .map_err(|err| handle_error(err.context("Storage sweep failed")));
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}
