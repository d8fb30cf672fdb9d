//! Age-based sweep of the storage root.
//!
//! The retention queue does not survive a restart, so anything scheduled
//! but not yet deleted when the process died would otherwise leak forever.
//! The sweep scans the storage root and hands every entry older than the
//! retention window to the scheduler for immediate deletion.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::background::retention::RetentionScheduler;
use crate::common::SPOOL_DIR;

/// Scan `root` and schedule deletion of every entry whose modification time
/// is at least `max_age` old. Returns how many entries were scheduled.
pub fn sweep_storage_root(
    root: &Path,
    max_age: Duration,
    scheduler: &RetentionScheduler,
) -> Result<usize> {
    let now = SystemTime::now();

    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err).context(format!("failed to read storage root {:?}", root)),
    };

    let mut scheduled = 0;
    for entry in entries.flatten() {
        if entry.file_name() == SPOOL_DIR {
            continue;
        }

        let modified = match entry.metadata().and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                warn!("Skipping unreadable entry {:?} during sweep: {}", entry.path(), err);
                continue;
            }
        };

        let stale = now
            .duration_since(modified)
            .map(|age| age >= max_age)
            .unwrap_or(false);
        if stale {
            scheduler.schedule_delete(vec![entry.path()], Duration::ZERO);
            scheduled += 1;
        }
    }

    if scheduled > 0 {
        info!("Sweep scheduled {} stale storage entries for deletion", scheduled);
    }
    Ok(scheduled)
}
