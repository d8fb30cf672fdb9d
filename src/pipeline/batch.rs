use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One inbound image: the validated upload layer hands the pipeline a name
/// and the raw bytes, nothing else.
#[derive(Debug)]
pub struct BatchItemInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Opaque process-unique batch token; doubles as the workspace directory
/// name and the archive stem.
pub fn generate_batch_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug)]
pub struct Batch {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub quality: u8,
    pub items: Vec<BatchItem>,
}

impl Batch {
    pub fn new(quality: u8, inputs: Vec<BatchItemInput>) -> Self {
        Self {
            id: generate_batch_id(),
            created_at: Utc::now(),
            quality,
            items: inputs.into_iter().map(BatchItem::new).collect(),
        }
    }
}

#[derive(Debug)]
pub struct BatchItem {
    pub original_name: String,
    pub original_size_bytes: u64,
    source_bytes: Vec<u8>,
    compressed_size_bytes: Option<u64>,
    artifact_path: Option<PathBuf>,
}

impl BatchItem {
    fn new(input: BatchItemInput) -> Self {
        Self {
            original_name: input.name,
            original_size_bytes: input.bytes.len() as u64,
            source_bytes: input.bytes,
            compressed_size_bytes: None,
            artifact_path: None,
        }
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source_bytes
    }

    /// Source bytes are only needed until the transcode outcome is known;
    /// dropping them early keeps large batches from holding every original
    /// in memory for the whole pipeline run.
    pub fn release_source(&mut self) {
        self.source_bytes = Vec::new();
    }

    /// Record the successful transcode. Called at most once, only after the
    /// artifact has actually been written to disk.
    pub fn mark_compressed(&mut self, size_bytes: u64, artifact_path: PathBuf) {
        debug_assert!(self.compressed_size_bytes.is_none());
        self.compressed_size_bytes = Some(size_bytes);
        self.artifact_path = Some(artifact_path);
    }

    pub fn compressed_size_bytes(&self) -> Option<u64> {
        self.compressed_size_bytes
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }
}
