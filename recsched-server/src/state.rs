//! Shared application state.

use std::sync::Arc;

use recsched_cache::Cache;
use recsched_core::CoreConfig;
use recsched_export::{csv, json};

use crate::memo::ExportMemo;

/// State shared by every handler.
pub struct AppState {
    pub cache: Arc<Cache>,
    pub exports: ExportMemo,
    pub config: CoreConfig,
    /// Rendered schema documents, computed once at startup so a broken
    /// schema fails the process early instead of a request.
    pub schema_json: Vec<u8>,
    pub schema_csv: Vec<u8>,
}

impl AppState {
    pub fn new(cache: Arc<Cache>, config: CoreConfig) -> Arc<AppState> {
        let mut schema_json = json::schema(config.schema_url.as_deref());
        schema_json.push(b'\n');
        let schema_csv = csv::schema();
        Arc::new(AppState {
            exports: ExportMemo::new(Arc::clone(&cache), config.clone()),
            cache,
            config,
            schema_json,
            schema_csv,
        })
    }
}
