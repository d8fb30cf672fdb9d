pub mod handlers;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use std::io::Cursor;

use crate::pipeline::PipelineError;
use crate::pipeline::archiver::ArchiveError;

#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn bad_request(error: anyhow::Error) -> Self {
        AppError {
            status: Status::BadRequest,
            error,
        }
    }
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let outer_msg = self.error.to_string();

        let chain: Vec<String> = self.error.chain().map(|e| e.to_string()).collect();

        let body = json!({
            "error": outer_msg,
            "chain": chain,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Map a pipeline failure onto the HTTP status the caller should see:
/// validation-class problems are the caller's fault, unreadable images are
/// unprocessable, everything else stays a 500.
pub fn pipeline_error_response(error: PipelineError) -> AppError {
    let status = match &error {
        PipelineError::QualityOutOfRange(_)
        | PipelineError::EmptyBatch
        | PipelineError::InvalidArtifactRef(_)
        | PipelineError::Archive(ArchiveError::EmptyInput) => Status::BadRequest,
        PipelineError::Transcode(_) | PipelineError::NoItemsSucceeded { .. } => {
            Status::UnprocessableEntity
        }
        PipelineError::Archive(_) | PipelineError::Storage(_) => Status::InternalServerError,
    };

    // Surface the per-item reasons of an all-failed batch in the body, not
    // just in the server log.
    let detail = match &error {
        PipelineError::NoItemsSucceeded { failed } => Some(
            failed
                .iter()
                .map(|item| format!("{}: {}", item.name, item.reason))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        _ => None,
    };

    let mut error = anyhow::Error::from(error);
    if let Some(detail) = detail {
        error = error.context(detail);
    }

    AppError { status, error }
}
