use dotenv::dotenv;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Process configuration, read once from the environment (with `.env`
/// support). Every field has a default so a bare `pixpress` starts up.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Root of all transient storage: one directory per batch plus the
    /// sibling `<batch_id>.zip` archives.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Seconds a finished batch stays on disk before it becomes eligible
    /// for deletion.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Seconds between scans of the retention scheduler's task queue.
    #[serde(default = "default_scheduler_tick_secs")]
    pub scheduler_tick_secs: u64,

    /// Seconds between age-based sweeps of the storage root. The sweep
    /// reclaims batches whose cleanup task was lost to a process restart.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Public mount point under which the storage root is served read-only.
    #[serde(default = "default_download_base")]
    pub download_base: String,
}

impl AppConfig {
    pub fn retention_delay(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage/temp")
}

fn default_retention_secs() -> u64 {
    60 * 60
}

fn default_scheduler_tick_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    15 * 60
}

fn default_download_base() -> String {
    "/downloads".to_string()
}

pub static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(|| {
    dotenv().ok();
    envy::from_env::<AppConfig>().expect("Failed to read configuration from environment")
});
