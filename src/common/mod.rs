pub mod errors;

pub const MIN_QUALITY: u8 = 1;

pub const MAX_QUALITY: u8 = 100;

/// Suffix inserted between the original stem and the `.jpg` extension of
/// every compressed artifact.
pub const COMPRESSED_SUFFIX: &'static str = "_compressed";

pub const ARTIFACT_EXTENSION: &'static str = "jpg";

pub const ARCHIVE_EXTENSION: &'static str = "zip";

/// Directory under the storage root where in-flight uploads are spooled
/// before entering the pipeline. Never served for download.
pub const SPOOL_DIR: &'static str = "spool";

use std::sync::LazyLock;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio::runtime::{Builder, Runtime};

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(|| rayon::current_num_threads());

// Rocket-specific Tokio Runtime
// This runtime is dedicated to handling network requests, with thread names clearly labeled.
pub static SERVER_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("server-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build server Tokio runtime")
});

// Background Worker-specific Tokio Runtime
// This runtime drives the retention scheduler loop and the storage sweep.
pub static BACKGROUND_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("background-task-worker")
        .enable_all()
        .build()
        .expect("Failed to build background Tokio runtime")
});

// Rayon thread pool for compute-intensive tasks
// Transcoding fans out here so a large batch never decodes more images
// simultaneously than there are cores.
pub static WORKER_RAYON_POOL: LazyLock<ThreadPool> = LazyLock::new(|| {
    ThreadPoolBuilder::new()
        .num_threads(*CURRENT_NUM_THREADS)
        .thread_name(|i| format!("transcode-worker-{}", i))
        .build()
        .expect("Failed to build worker Rayon pool")
});
