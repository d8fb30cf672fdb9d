pub mod compress;

use rocket::{Route, routes};

pub fn generate_compress_routes() -> Vec<Route> {
    routes![
        compress::compress_batch,
        compress::compress_single,
        compress::archive_artifacts
    ]
}
