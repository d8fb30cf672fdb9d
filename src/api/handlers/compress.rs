use anyhow::{Context, Result, anyhow};
use log::info;
use rocket::form::{Errors, Form, FromForm};
use rocket::fs::TempFile;
use rocket::post;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::task::spawn_blocking;
use uuid::Uuid;

use crate::api::{AppError, AppResult, pipeline_error_response};
use crate::common::SPOOL_DIR;
use crate::config::APP_CONFIG;
use crate::pipeline::batch::BatchItemInput;
use crate::pipeline::{COORDINATOR, FailedItem};

#[derive(FromForm, Debug)]
pub struct BatchUploadForm<'r> {
    /// The images of one batch, in submission order
    #[field(name = "images")]
    pub images: Vec<TempFile<'r>>,

    /// JPEG quality applied to every image of the batch
    #[field(name = "quality")]
    pub quality: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompressResponse {
    pub compressed_sizes: Vec<u64>,
    pub zip_url: String,
    pub failed: Vec<FailedItem>,
}

#[post("/compress", data = "<form>")]
pub async fn compress_batch(
    form: Result<Form<BatchUploadForm<'_>>, Errors<'_>>,
) -> AppResult<Json<BatchCompressResponse>> {
    let mut inner_form = into_inner_form(form)?;
    let quality = inner_form.quality;

    let start_time = Instant::now();
    let mut inputs = Vec::with_capacity(inner_form.images.len());
    for file in inner_form.images.iter_mut() {
        inputs.push(spool_upload(file).await?);
    }

    let result = spawn_blocking(move || COORDINATOR.submit_batch(inputs, quality))
        .await?
        .map_err(pipeline_error_response)?;

    let duration = format!("{:?}", start_time.elapsed());
    info!(duration = &*duration;
        "Compressed batch {}: {} succeeded, {} failed",
        result.batch_id,
        result.sizes.len(),
        result.failed.len(),
    );

    Ok(Json(BatchCompressResponse {
        compressed_sizes: result.sizes,
        zip_url: result.download_ref,
        failed: result.failed,
    }))
}

#[derive(FromForm, Debug)]
pub struct SingleUploadForm<'r> {
    #[field(name = "image")]
    pub image: TempFile<'r>,

    #[field(name = "quality")]
    pub quality: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleCompressResponse {
    pub compressed_size: u64,
    pub file_url: String,
}

#[post("/compress/single", data = "<form>")]
pub async fn compress_single(
    form: Result<Form<SingleUploadForm<'_>>, Errors<'_>>,
) -> AppResult<Json<SingleCompressResponse>> {
    let mut inner_form = into_inner_form(form)?;
    let quality = inner_form.quality;

    let input = spool_upload(&mut inner_form.image).await?;

    let result =
        spawn_blocking(move || COORDINATOR.submit_single(&input.name, &input.bytes, quality))
            .await?
            .map_err(pipeline_error_response)?;

    Ok(Json(SingleCompressResponse {
        compressed_size: result.compressed_size,
        file_url: result.artifact_ref,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    /// Artifact references relative to the storage root
    pub artifacts: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveResponse {
    pub zip_url: String,
}

#[post("/archive", format = "json", data = "<request>")]
pub async fn archive_artifacts(request: Json<ArchiveRequest>) -> AppResult<Json<ArchiveResponse>> {
    let refs = request.into_inner().artifacts;

    let result = spawn_blocking(move || COORDINATOR.archive_existing(&refs))
        .await?
        .map_err(pipeline_error_response)?;

    Ok(Json(ArchiveResponse {
        zip_url: result.download_ref,
    }))
}

fn into_inner_form<T>(form: Result<Form<T>, Errors<'_>>) -> Result<T, AppError> {
    match form {
        Ok(form) => Ok(form.into_inner()),
        Err(errors) => {
            let error_chain = errors
                .iter()
                .map(|e| anyhow!(e.to_string()))
                .reduce(|acc, e| acc.context(e.to_string()));

            match error_chain {
                Some(chain) => Err(AppError::bad_request(chain.context("Failed to parse form"))),
                None => Err(AppError::bad_request(anyhow!(
                    "Failed to parse form with unknown error"
                ))),
            }
        }
    }
}

fn get_filename(file: &TempFile<'_>) -> String {
    file.name()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "".to_string())
}

/// Spool one upload through disk and hand its bytes to the pipeline.
///
/// Rocket may keep small uploads in memory and large ones in its own temp
/// location; copying into our spool area first gives both cases one code
/// path and keeps foreign temp files out of the storage root.
async fn spool_upload(file: &mut TempFile<'_>) -> Result<BatchItemInput> {
    let name = get_filename(file);

    let spool_path = APP_CONFIG
        .storage_root
        .join(SPOOL_DIR)
        .join(format!("{}.upload", Uuid::new_v4().simple()));

    file.move_copy_to(&spool_path)
        .await
        .context("failed to spool upload to disk")?;
    let bytes = tokio::fs::read(&spool_path)
        .await
        .context("failed to read spooled upload")?;
    let _ = tokio::fs::remove_file(&spool_path).await;

    Ok(BatchItemInput { name, bytes })
}
