use anyhow::Error;
use log::error;

/// Log the full error chain and hand the error back, so fire-and-forget
/// call sites keep a single-line `map_err(handle_error)`.
pub fn handle_error(error: Error) -> Error {
    error!("{:#?}", error);
    error
}
