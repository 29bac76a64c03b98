//! HTTP routes.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub mod blobs;
pub mod export;
pub mod versions;

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/", get(versions::list))
        .route("/v1/{spec}", get(blobs::serve_bare))
        .route("/v1/{spec}/{format}", get(blobs::serve))
        .route("/export/schema.json", get(export::schema_json))
        .route("/export/schema.csv", get(export::schema_csv))
        .route("/export/{file}", get(export::serve))
        .with_state(state)
}
