//! Zip packaging of a batch's compressed artifacts.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use log::warn;
use thiserror::Error;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no artifacts were supplied")]
    EmptyInput,

    #[error("archive I/O failed")]
    Io(#[from] io::Error),

    #[error("archive encoding failed")]
    Zip(#[from] ZipError),
}

pub struct ArchiveHandle {
    pub path: PathBuf,
    pub entry_count: usize,
}

/// Package `artifact_paths` into a single zip at `destination`.
///
/// Entries are added in the order given, each under its base file name with
/// no directory nesting. An artifact that vanished between transcode and
/// packaging is skipped with a warning: that indicates a race with cleanup
/// or an external deletion, not a caller error. The archive is finalized and
/// synced before the handle is returned; on failure the half-written file is
/// removed so no partial archive is ever visible to downloads.
pub fn pack(artifact_paths: &[PathBuf], destination: &Path) -> Result<ArchiveHandle, ArchiveError> {
    if artifact_paths.is_empty() {
        return Err(ArchiveError::EmptyInput);
    }

    match write_entries(artifact_paths, destination) {
        Ok(entry_count) => Ok(ArchiveHandle {
            path: destination.to_path_buf(),
            entry_count,
        }),
        Err(error) => {
            let _ = fs::remove_file(destination);
            Err(error)
        }
    }
}

fn write_entries(artifact_paths: &[PathBuf], destination: &Path) -> Result<usize, ArchiveError> {
    let file = File::create(destination)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let mut entry_count = 0;
    for path in artifact_paths {
        let mut input = match File::open(path) {
            Ok(input) => input,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("Artifact {:?} vanished before packaging, skipping", path);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let entry_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("artifact_{}", entry_count));

        zip.start_file(entry_name, options)?;
        io::copy(&mut input, &mut zip)?;
        entry_count += 1;
    }

    let file = zip.finish()?;
    file.sync_all()?;
    Ok(entry_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::ZipArchive;

    fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn packs_entries_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_artifact(dir.path(), "a_compressed.jpg", b"aaa");
        let b = write_artifact(dir.path(), "b_compressed.jpg", b"bbb");
        let destination = dir.path().join("batch.zip");

        let handle = pack(&[a, b], &destination).unwrap();
        assert_eq!(handle.entry_count, 2);

        let mut archive = ZipArchive::new(File::open(&handle.path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0).unwrap().name(), "a_compressed.jpg");
        assert_eq!(archive.by_index(1).unwrap().name(), "b_compressed.jpg");
    }

    #[test]
    fn empty_input_is_rejected_without_creating_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("batch.zip");

        let result = pack(&[], &destination);
        assert!(matches!(result, Err(ArchiveError::EmptyInput)));
        assert!(!destination.exists());
    }

    #[test]
    fn vanished_artifact_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let kept = write_artifact(dir.path(), "kept_compressed.jpg", b"kept");
        let gone = dir.path().join("gone_compressed.jpg");
        let destination = dir.path().join("batch.zip");

        let handle = pack(&[gone, kept], &destination).unwrap();
        assert_eq!(handle.entry_count, 1);

        let mut archive = ZipArchive::new(File::open(&handle.path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.by_index(0).unwrap().name(), "kept_compressed.jpg");
    }
}
