//! `GET /v1/`: the version listing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::SecondsFormat;
use recsched_cache::DataVersion;
use recsched_core::ContentHash;
use serde::Serialize;

use crate::error::{Result, ServerError};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 25;
const MAX_LIMIT: usize = 500;

/// One listing entry.
#[derive(Serialize)]
struct VersionEntry {
    id: String,
    updated: String,
    revision: i64,
}

/// Validated query parameters.
#[derive(Debug, PartialEq)]
struct ListParams {
    limit: usize,
    after: Option<String>,
    revisions: bool,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response> {
    let params = parse_params(&query)?;

    let cache = Arc::clone(&state.cache);
    let versions = tokio::task::spawn_blocking(move || cache.versions())
        .await
        .map_err(|e| ServerError::internal(format!("listing task: {e}")))??;

    let entries = select(&versions, &params, state.config.timezone);
    let body = serde_json::to_vec(&entries)
        .map_err(|e| ServerError::internal(format!("encode listing: {e}")))?;

    Ok((
        [
            (header::CACHE_CONTROL, "public, max-age=60"),
            (header::CONTENT_TYPE, "application/json; charset=utf-8"),
        ],
        body,
    )
        .into_response())
}

fn parse_params(query: &HashMap<String, String>) -> Result<ListParams> {
    let mut params = ListParams {
        limit: DEFAULT_LIMIT,
        after: None,
        revisions: false,
    };
    for (key, value) in query {
        match key.as_str() {
            "limit" => {
                let limit: i64 = value
                    .parse()
                    .map_err(|_| ServerError::bad_request("invalid limit int"))?;
                if limit <= 0 || limit as usize > MAX_LIMIT {
                    return Err(ServerError::bad_request("limit out of range"));
                }
                params.limit = limit as usize;
            }
            "after" => {
                if !ContentHash::is_id(value) {
                    return Err(ServerError::bad_request("after is not a valid data id"));
                }
                params.after = Some(value.clone());
            }
            "revisions" => {
                params.revisions = value
                    .parse()
                    .map_err(|_| ServerError::bad_request("invalid revisions bool"))?;
            }
            other => {
                return Err(ServerError::bad_request(format!(
                    "invalid parameter {other:?}"
                )));
            }
        }
    }
    Ok(params)
}

/// Apply the `after` cursor, revision collapsing, and the limit, newest
/// first. Revision collapsing compares against the previous row of the full
/// stream, so a cursor landing inside a revision run cannot hide rows.
fn select(versions: &[DataVersion], params: &ListParams, tz: chrono_tz::Tz) -> Vec<VersionEntry> {
    let mut out = Vec::new();
    let mut seen_after = params.after.is_none();
    let mut remaining = params.limit;
    for (i, ver) in versions.iter().enumerate() {
        if !seen_after {
            if Some(ver.id.as_str()) == params.after.as_deref() {
                seen_after = true;
            }
            continue;
        }
        if !params.revisions {
            if let Some(prev) = i.checked_sub(1).map(|p| &versions[p]) {
                if prev.updated == ver.updated {
                    continue;
                }
            }
        }
        if remaining == 0 {
            break;
        }
        remaining -= 1;
        out.push(VersionEntry {
            id: ver.id.clone(),
            updated: ver
                .updated
                .with_timezone(&tz)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            revision: ver.revision,
        });
    }
    out
}
