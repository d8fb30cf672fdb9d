//! Setup/initialization module - handles application startup tasks
//!
//! Includes:
//! - Logger initialization
//! - Storage folder initialization

use crate::common::SPOOL_DIR;
use crate::config::APP_CONFIG;
use anyhow::{Context, Result};
use env_logger::Builder;
use log::info;

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

/// Initialize the process-wide logger.
///
/// INFO and above globally; Rocket's own chatter is capped at WARN so the
/// pipeline logs stay readable.
pub fn initialize_logger() {
    Builder::new()
        .filter(None, log::LevelFilter::Info)
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .parse_default_env()
        .init();
}

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

/// Create the transient storage layout: the storage root itself plus the
/// spool area for in-flight uploads.
pub fn initialize_folder() -> Result<()> {
    let root = &APP_CONFIG.storage_root;
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create storage root {:?}", root))?;
    std::fs::create_dir_all(root.join(SPOOL_DIR))
        .with_context(|| format!("failed to create spool directory under {:?}", root))?;
    info!("Storage root ready at {:?}", root);
    Ok(())
}
