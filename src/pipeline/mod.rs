//! The batch compression-and-packaging pipeline.
//!
//! `PipelineCoordinator` is the single entry point callers use: it validates
//! the request, fans per-image transcoding out over the worker pool, writes
//! the artifacts into a batch-scoped workspace, packages them into a zip and
//! registers the deferred cleanup of everything it produced.

pub mod archiver;
pub mod batch;
pub mod transcoder;
pub mod workspace;

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{info, warn};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use thiserror::Error;

use crate::background::retention::{RETENTION, RetentionScheduler};
use crate::common::{ARCHIVE_EXTENSION, MAX_QUALITY, MIN_QUALITY, WORKER_RAYON_POOL};
use crate::config::APP_CONFIG;
use archiver::ArchiveError;
use batch::{Batch, BatchItemInput, generate_batch_id};
use transcoder::{TranscodeError, compress_image};
use workspace::BatchWorkspace;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("quality must be within {MIN_QUALITY}..={MAX_QUALITY}, got {0}")]
    QualityOutOfRange(u8),

    #[error("no images were supplied")]
    EmptyBatch,

    #[error("none of the supplied images could be compressed")]
    NoItemsSucceeded { failed: Vec<FailedItem> },

    #[error("image could not be compressed")]
    Transcode(#[from] TranscodeError),

    #[error("artifact reference {0:?} does not resolve inside the storage root")]
    InvalidArtifactRef(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// One item of a partially-failed batch, correlated back to the caller's
/// input by its original index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct BatchResult {
    pub batch_id: String,
    /// Compressed sizes of succeeded items, in input order. Failed items are
    /// omitted here and reported in `failed` instead.
    pub sizes: Vec<u64>,
    pub download_ref: String,
    pub failed: Vec<FailedItem>,
}

#[derive(Debug)]
pub struct SingleResult {
    pub compressed_size: u64,
    pub artifact_ref: String,
}

#[derive(Debug)]
pub struct ArchiveResult {
    pub download_ref: String,
}

pub struct PipelineCoordinator {
    storage_root: PathBuf,
    download_base: String,
    retention: Arc<RetentionScheduler>,
    retention_delay: Duration,
}

pub static COORDINATOR: LazyLock<PipelineCoordinator> = LazyLock::new(|| {
    PipelineCoordinator::new(
        APP_CONFIG.storage_root.clone(),
        APP_CONFIG.download_base.clone(),
        RETENTION.clone(),
        APP_CONFIG.retention_delay(),
    )
});

impl PipelineCoordinator {
    pub fn new(
        storage_root: PathBuf,
        download_base: String,
        retention: Arc<RetentionScheduler>,
        retention_delay: Duration,
    ) -> Self {
        Self {
            storage_root,
            download_base,
            retention,
            retention_delay,
        }
    }

    /// Compress every item of a batch at `quality`, package the results and
    /// schedule the deferred cleanup.
    ///
    /// Per-item failures do not abort the batch; the call only fails outright
    /// when validation rejects it or when no item survives transcoding.
    pub fn submit_batch(
        &self,
        inputs: Vec<BatchItemInput>,
        quality: u8,
    ) -> Result<BatchResult, PipelineError> {
        validate_quality(quality)?;
        if inputs.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let mut batch = Batch::new(quality, inputs);
        let mut workspace = BatchWorkspace::create(&self.storage_root, &batch.id)?;

        // Step 1: Transcode every item on the worker pool. Collecting through
        // the indexed iterator keeps outcomes aligned with input order no
        // matter which worker finishes first.
        let outcomes: Vec<Result<Vec<u8>, TranscodeError>> = WORKER_RAYON_POOL.install(|| {
            batch
                .items
                .par_iter()
                .map(|item| compress_image(item.source_bytes(), batch.quality))
                .collect()
        });

        // Step 2: Persist the survivors into the workspace.
        let mut failed = Vec::new();
        for (index, (item, outcome)) in batch.items.iter_mut().zip(outcomes).enumerate() {
            match outcome {
                Ok(bytes) => match workspace.write_artifact(&item.original_name, &bytes) {
                    Ok(path) => item.mark_compressed(bytes.len() as u64, path),
                    Err(err) => {
                        warn!("Failed writing artifact for '{}': {:#}", item.original_name, err);
                        failed.push(FailedItem {
                            index,
                            name: item.original_name.clone(),
                            reason: format!("{:#}", err),
                        });
                    }
                },
                Err(err) => {
                    warn!("Item '{}' failed to transcode: {}", item.original_name, err);
                    failed.push(FailedItem {
                        index,
                        name: item.original_name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
            item.release_source();
        }

        if workspace.list_artifacts().is_empty() {
            // Nothing survived; hand the empty workspace straight to the
            // scheduler instead of waiting out the retention window.
            self.retention
                .schedule_delete(vec![workspace.dir().to_path_buf()], Duration::ZERO);
            return Err(PipelineError::NoItemsSucceeded { failed });
        }

        // Step 3: Package the artifacts beside the workspace.
        let archive_path = self.archive_path(&batch.id);
        let handle = archiver::pack(workspace.list_artifacts(), &archive_path)?;

        // Step 4: Register deferred cleanup of the workspace and the archive
        // as one task so they disappear together.
        self.retention.schedule_delete(
            vec![workspace.dir().to_path_buf(), handle.path.clone()],
            self.retention_delay,
        );

        info!(
            "Batch {} compressed {} of {} items into {:?}",
            batch.id,
            handle.entry_count,
            batch.items.len(),
            handle.path
        );

        let sizes = batch
            .items
            .iter()
            .filter_map(|item| item.compressed_size_bytes())
            .collect();

        Ok(BatchResult {
            download_ref: format!("{}/{}.{}", self.download_base, batch.id, ARCHIVE_EXTENSION),
            batch_id: batch.id,
            sizes,
            failed,
        })
    }

    /// Single-image convenience path: compress one image and expose the
    /// artifact itself for download, no archive.
    pub fn submit_single(
        &self,
        name: &str,
        bytes: &[u8],
        quality: u8,
    ) -> Result<SingleResult, PipelineError> {
        validate_quality(quality)?;

        let compressed = compress_image(bytes, quality)?;

        let batch_id = generate_batch_id();
        let mut workspace = BatchWorkspace::create(&self.storage_root, &batch_id)?;
        let artifact_path = workspace.write_artifact(name, &compressed)?;

        self.retention
            .schedule_delete(vec![workspace.dir().to_path_buf()], self.retention_delay);

        let file_name = artifact_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(SingleResult {
            compressed_size: compressed.len() as u64,
            artifact_ref: format!("{}/{}/{}", self.download_base, batch_id, file_name),
        })
    }

    /// Package already-produced artifacts (referenced relative to the
    /// storage root) into a fresh archive.
    pub fn archive_existing(&self, refs: &[String]) -> Result<ArchiveResult, PipelineError> {
        if refs.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        let mut paths = Vec::with_capacity(refs.len());
        for reference in refs {
            paths.push(self.resolve_artifact_ref(reference)?);
        }

        let archive_id = generate_batch_id();
        let destination = self.archive_path(&archive_id);
        let handle = archiver::pack(&paths, &destination)?;

        self.retention
            .schedule_delete(vec![handle.path], self.retention_delay);

        Ok(ArchiveResult {
            download_ref: format!("{}/{}.{}", self.download_base, archive_id, ARCHIVE_EXTENSION),
        })
    }

    fn archive_path(&self, batch_id: &str) -> PathBuf {
        self.storage_root
            .join(format!("{}.{}", batch_id, ARCHIVE_EXTENSION))
    }

    /// Caller-supplied references must stay inside the storage root: only
    /// plain relative components are accepted, anything else is rejected
    /// rather than silently rewritten.
    fn resolve_artifact_ref(&self, reference: &str) -> Result<PathBuf, PipelineError> {
        let path = Path::new(reference);
        let all_normal = path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !all_normal || path.as_os_str().is_empty() {
            return Err(PipelineError::InvalidArtifactRef(reference.to_string()));
        }
        Ok(self.storage_root.join(path))
    }
}

fn validate_quality(quality: u8) -> Result<(), PipelineError> {
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(PipelineError::QualityOutOfRange(quality));
    }
    Ok(())
}
