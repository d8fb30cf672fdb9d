//! Per-batch temporary workspace under the storage root.
//!
//! The directory name comes from the process-generated batch id, never from
//! user input, so two batches can never collide and uploaded filenames can
//! never steer writes outside the workspace.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

use crate::common::{ARTIFACT_EXTENSION, COMPRESSED_SUFFIX};

pub struct BatchWorkspace {
    batch_id: String,
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    used_names: HashSet<String>,
}

impl BatchWorkspace {
    /// Allocate the batch's directory under `storage_root`.
    pub fn create(storage_root: &Path, batch_id: &str) -> Result<Self> {
        let dir = storage_root.join(batch_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create batch workspace {:?}", dir))?;
        Ok(Self {
            batch_id: batch_id.to_string(),
            dir,
            artifacts: Vec::new(),
            used_names: HashSet::new(),
        })
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one compressed artifact and return its path.
    ///
    /// The file is named `<stem>_compressed.jpg`; when two inputs in the
    /// same batch share a stem, a counter is appended so neither overwrites
    /// the other.
    pub fn write_artifact(&mut self, original_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let stem = sanitize_stem(original_name);
        let base = format!("{}{}", stem, COMPRESSED_SUFFIX);

        let mut file_name = format!("{}.{}", base, ARTIFACT_EXTENSION);
        let mut counter = 0;
        while self.used_names.contains(&file_name) {
            counter += 1;
            file_name = format!("{}_{}.{}", base, counter, ARTIFACT_EXTENSION);
        }

        let path = self.dir.join(&file_name);
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write artifact {:?}", path))?;

        self.used_names.insert(file_name);
        self.artifacts.push(path.clone());
        Ok(path)
    }

    /// Artifact paths in the order they were written.
    pub fn list_artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Best-effort removal of the workspace directory and everything in it.
    ///
    /// A missing directory or missing entries count as success so a retried
    /// cleanup can never get stuck on work a previous attempt already did.
    pub fn destroy(&self) -> Result<()> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).context(format!("failed to read workspace {:?}", self.dir));
            }
        };

        for entry in entries.flatten() {
            if let Err(err) = fs::remove_file(entry.path()) {
                if err.kind() != ErrorKind::NotFound {
                    warn!("Failed deleting artifact {:?}: {}", entry.path(), err);
                }
            }
        }

        match fs::remove_dir(&self.dir) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                warn!("Failed removing workspace {:?}: {}", self.dir, err);
                Err(err).context(format!("failed to remove workspace {:?}", self.dir))
            }
        }
    }
}

/// Reduce an uploaded filename to a bare stem: path components are dropped
/// so names like `../../x.png` cannot traverse out of the workspace.
fn sanitize_stem(original_name: &str) -> String {
    let last = Path::new(original_name)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .last();

    let stem = last
        .map(|part| {
            Path::new(part)
                .file_stem()
                .unwrap_or(part)
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_default();

    if stem.is_empty() { "image".to_string() } else { stem }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_are_suffixed_and_deduplicated() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = BatchWorkspace::create(root.path(), "batch-a").unwrap();

        let first = workspace.write_artifact("photo.png", b"one").unwrap();
        let second = workspace.write_artifact("photo.jpeg", b"two").unwrap();
        let third = workspace.write_artifact("photo.webp", b"three").unwrap();

        assert_eq!(first.file_name().unwrap(), "photo_compressed.jpg");
        assert_eq!(second.file_name().unwrap(), "photo_compressed_1.jpg");
        assert_eq!(third.file_name().unwrap(), "photo_compressed_2.jpg");
        assert_eq!(workspace.list_artifacts().len(), 3);
        assert_eq!(fs::read(&second).unwrap(), b"two");
    }

    #[test]
    fn traversal_names_stay_inside_the_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = BatchWorkspace::create(root.path(), "batch-b").unwrap();

        let path = workspace.write_artifact("../../evil.png", b"x").unwrap();
        assert!(path.starts_with(workspace.dir()));
        assert_eq!(path.file_name().unwrap(), "evil_compressed.jpg");
    }

    #[test]
    fn nameless_input_gets_a_fallback_stem() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = BatchWorkspace::create(root.path(), "batch-c").unwrap();

        let path = workspace.write_artifact("", b"x").unwrap();
        assert_eq!(path.file_name().unwrap(), "image_compressed.jpg");
    }

    #[test]
    fn destroy_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut workspace = BatchWorkspace::create(root.path(), "batch-d").unwrap();
        workspace.write_artifact("a.png", b"bytes").unwrap();

        workspace.destroy().unwrap();
        assert!(!workspace.dir().exists());

        // Second pass over an already-removed workspace is a no-op success.
        workspace.destroy().unwrap();
    }
}
