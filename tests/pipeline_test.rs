use std::fs;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use zip::ZipArchive;

use pixpress::background::retention::{RetentionScheduler, current_timestamp_ms};
use pixpress::pipeline::batch::BatchItemInput;
use pixpress::pipeline::{PipelineCoordinator, PipelineError};

const DOWNLOAD_BASE: &str = "/downloads";

fn coordinator(root: &Path) -> (Arc<PipelineCoordinator>, Arc<RetentionScheduler>) {
    let scheduler = Arc::new(RetentionScheduler::new());
    let coordinator = Arc::new(PipelineCoordinator::new(
        root.to_path_buf(),
        DOWNLOAD_BASE.to_string(),
        scheduler.clone(),
        Duration::from_secs(3600),
    ));
    (coordinator, scheduler)
}

fn image_bytes(format: ImageFormat, side: u32, seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(side, side, |x, y| {
        Rgb([
            (x.wrapping_mul(7).wrapping_add(seed as u32) % 256) as u8,
            (y.wrapping_mul(13) % 256) as u8,
            ((x + y) % 256) as u8,
        ])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn jpeg_item(name: &str, side: u32, seed: u8) -> BatchItemInput {
    BatchItemInput {
        name: name.to_string(),
        bytes: image_bytes(ImageFormat::Jpeg, side, seed),
    }
}

fn corrupt_item(name: &str) -> BatchItemInput {
    BatchItemInput {
        name: name.to_string(),
        bytes: b"this is not an image".to_vec(),
    }
}

fn archive_entry_names(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn batch_of_three_valid_images_compresses_and_packages() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, scheduler) = coordinator(root.path());

    let items = vec![
        jpeg_item("alpha.jpg", 96, 1),
        jpeg_item("beta.jpg", 96, 2),
        jpeg_item("gamma.jpg", 96, 3),
    ];
    let result = coordinator.submit_batch(items, 80).unwrap();

    assert_eq!(result.sizes.len(), 3);
    assert!(result.sizes.iter().all(|&size| size > 0));
    assert!(result.failed.is_empty());
    assert_eq!(
        result.download_ref,
        format!("{}/{}.zip", DOWNLOAD_BASE, result.batch_id)
    );

    let archive_path = root.path().join(format!("{}.zip", result.batch_id));
    assert!(archive_path.exists());
    assert_eq!(
        archive_entry_names(&archive_path),
        vec![
            "alpha_compressed.jpg",
            "beta_compressed.jpg",
            "gamma_compressed.jpg"
        ]
    );

    // Workspace and archive share a single pending cleanup task.
    assert_eq!(scheduler.pending_count(), 1);
}

#[test]
fn sizes_follow_input_order_and_match_the_artifacts() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    // Different dimensions so the two sizes cannot collide by accident.
    let items = vec![jpeg_item("big.jpg", 128, 1), jpeg_item("small.jpg", 48, 2)];
    let result = coordinator.submit_batch(items, 80).unwrap();

    let workspace = root.path().join(&result.batch_id);
    let big = fs::metadata(workspace.join("big_compressed.jpg")).unwrap().len();
    let small = fs::metadata(workspace.join("small_compressed.jpg"))
        .unwrap()
        .len();
    assert_eq!(result.sizes, vec![big, small]);
}

#[test]
fn partial_failure_reports_failed_items() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    let items = vec![jpeg_item("ok.jpg", 96, 1), corrupt_item("broken.jpg")];
    let result = coordinator.submit_batch(items, 80).unwrap();

    // Failed items are omitted from sizes and flagged separately, with the
    // original input index preserved.
    assert_eq!(result.sizes.len(), 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].index, 1);
    assert_eq!(result.failed[0].name, "broken.jpg");

    let archive_path = root.path().join(format!("{}.zip", result.batch_id));
    assert_eq!(archive_entry_names(&archive_path), vec!["ok_compressed.jpg"]);
}

#[test]
fn all_failed_batch_is_rejected_and_workspace_reclaimed() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, scheduler) = coordinator(root.path());

    let items = vec![corrupt_item("a.jpg"), corrupt_item("b.jpg")];
    let error = coordinator.submit_batch(items, 80).unwrap_err();

    match error {
        PipelineError::NoItemsSucceeded { failed } => {
            assert_eq!(failed.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // No archive was produced and the empty workspace is already queued for
    // deletion with no delay.
    assert_eq!(scheduler.pending_count(), 1);
    assert_eq!(scheduler.run_due(current_timestamp_ms()), 1);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn quality_is_validated_before_any_io() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    let error = coordinator
        .submit_batch(vec![jpeg_item("x.jpg", 48, 1)], 0)
        .unwrap_err();
    assert!(matches!(error, PipelineError::QualityOutOfRange(0)));

    let error = coordinator
        .submit_batch(vec![jpeg_item("x.jpg", 48, 1)], 101)
        .unwrap_err();
    assert!(matches!(error, PipelineError::QualityOutOfRange(101)));

    let error = coordinator.submit_batch(Vec::new(), 80).unwrap_err();
    assert!(matches!(error, PipelineError::EmptyBatch));

    // Nothing was written for any of the rejected calls.
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn concurrent_batches_with_identical_filenames_stay_isolated() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    let handles: Vec<_> = (0..2)
        .map(|seed| {
            let coordinator = coordinator.clone();
            std::thread::spawn(move || {
                coordinator
                    .submit_batch(vec![jpeg_item("photo.jpg", 96, seed)], 80)
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_ne!(results[0].batch_id, results[1].batch_id);
    for result in &results {
        let archive_path = root.path().join(format!("{}.zip", result.batch_id));
        assert_eq!(archive_entry_names(&archive_path), vec!["photo_compressed.jpg"]);
        assert!(
            root.path()
                .join(&result.batch_id)
                .join("photo_compressed.jpg")
                .exists()
        );
    }
}

#[test]
fn single_image_path_produces_a_downloadable_artifact() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, scheduler) = coordinator(root.path());

    let bytes = image_bytes(ImageFormat::Png, 96, 7);
    let result = coordinator.submit_single("portrait.png", &bytes, 70).unwrap();

    assert!(result.compressed_size > 0);
    assert!(result.artifact_ref.starts_with(DOWNLOAD_BASE));
    assert!(result.artifact_ref.ends_with("/portrait_compressed.jpg"));

    // The ref resolves to a real file under the storage root.
    let relative = result
        .artifact_ref
        .strip_prefix(&format!("{}/", DOWNLOAD_BASE))
        .unwrap();
    assert!(root.path().join(relative).exists());
    assert_eq!(scheduler.pending_count(), 1);
}

#[test]
fn archiving_zero_artifacts_is_rejected_without_creating_a_file() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    let error = coordinator.archive_existing(&[]).unwrap_err();
    assert!(matches!(error, PipelineError::EmptyBatch));
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[test]
fn existing_artifacts_can_be_repackaged() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    let batch = coordinator
        .submit_batch(vec![jpeg_item("keep.jpg", 96, 1)], 80)
        .unwrap();

    let reference = format!("{}/keep_compressed.jpg", batch.batch_id);
    let archive = coordinator.archive_existing(&[reference]).unwrap();

    let relative = archive
        .download_ref
        .strip_prefix(&format!("{}/", DOWNLOAD_BASE))
        .unwrap();
    let archive_path = root.path().join(relative);
    assert_eq!(archive_entry_names(&archive_path), vec!["keep_compressed.jpg"]);
}

#[test]
fn artifact_references_cannot_escape_the_storage_root() {
    let root = tempfile::tempdir().unwrap();
    let (coordinator, _) = coordinator(root.path());

    for reference in ["../secrets.txt", "/etc/passwd", ""] {
        let error = coordinator
            .archive_existing(&[reference.to_string()])
            .unwrap_err();
        assert!(
            matches!(error, PipelineError::InvalidArtifactRef(_)),
            "reference {reference:?} should be rejected"
        );
    }
}
