//! `GET /v1/{spec}[/{format}]`: raw snapshot files.
//!
//! Non-canonical specs redirect to the canonical id URL so downstream
//! caches key on immutable content; a missing format redirects to the
//! canonical binary payload. Content encoding is negotiated between
//! identity and gzip (blobs are stored gzipped, so gzip responses are a
//! straight copy), with the coding reflected in the weak ETag.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use recsched_cache::Resolved;

use crate::error::{Result, ServerError};
use crate::negotiate::{accepts_gzip, blob_etag, none_match};
use crate::state::AppState;

pub async fn serve_bare(
    state: State<Arc<AppState>>,
    Path(spec): Path<String>,
    query: Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response> {
    serve_inner(state, spec, String::new(), query, headers).await
}

pub async fn serve(
    state: State<Arc<AppState>>,
    Path((spec, format)): Path<(String, String)>,
    query: Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response> {
    serve_inner(state, spec, format, query, headers).await
}

async fn serve_inner(
    State(state): State<Arc<AppState>>,
    spec: String,
    format: String,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response> {
    if let Some(key) = query.keys().next() {
        return Err(ServerError::bad_request(format!(
            "invalid parameter {key:?}"
        )));
    }

    let cache = Arc::clone(&state.cache);
    let resolve_spec = if spec.is_empty() {
        "latest".to_string()
    } else {
        spec.clone()
    };
    let resolved = tokio::task::spawn_blocking(move || cache.resolve_version(&resolve_spec))
        .await
        .map_err(|e| ServerError::internal(format!("resolver task: {e}")))??;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::VARY, "Accept-Encoding".parse().expect("header"));
    response_headers.insert(
        header::CACHE_CONTROL,
        "public, max-age=60".parse().expect("header"),
    );

    let (id, updated) = match resolved {
        Resolved::Invalid => {
            return Err(ServerError::bad_request(format!(
                "invalid spec format {spec:?}"
            )));
        }
        Resolved::NoMatch => {
            if spec.is_empty() || spec == "latest" {
                return Err(ServerError::unavailable("no data available, try again later"));
            }
            return Err(ServerError::not_found(format!("no match for {spec:?}")));
        }
        Resolved::Found { id, updated } => (id, updated),
    };

    // snapshot update time travels along; not Last-Modified, which would
    // claim something about the response body itself
    response_headers.insert(
        "x-schedule-updated",
        updated
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
            .parse()
            .expect("header"),
    );

    // canonicalize: id first, then default format
    if spec != id {
        return Ok(redirect(response_headers, &format_url(&id, &format)));
    }
    if format.is_empty() {
        return Ok(redirect(response_headers, &format_url(&id, "pb")));
    }

    let content_type = match format.as_str() {
        "pb" => "application/x-protobuf",
        "proto" | "textpb" => "text/plain; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        _ => return Err(ServerError::not_found("unknown format")),
    };
    response_headers.insert(header::CONTENT_TYPE, content_type.parse().expect("header"));

    let cache = Arc::clone(&state.cache);
    let lookup_id = id.clone();
    let lookup_format = format.clone();
    let hash = tokio::task::spawn_blocking(move || cache.format_blob(&lookup_id, &lookup_format))
        .await
        .map_err(|e| ServerError::internal(format!("format task: {e}")))??
        .ok_or_else(|| ServerError::not_found("format not found"))?;

    let gzip = accepts_gzip(&headers);
    if gzip {
        response_headers.insert(header::CONTENT_ENCODING, "gzip".parse().expect("header"));
    }

    // resolved-id URLs are immutable in practice; cache them hard
    response_headers.insert(
        header::CACHE_CONTROL,
        "public, max-age=604800".parse().expect("header"),
    );

    let etag = blob_etag(&hash, gzip.then_some("gzip"));
    response_headers.insert(header::ETAG, etag.parse().expect("header"));
    if none_match(&headers, &etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }

    let cache = Arc::clone(&state.cache);
    let blob_hash = hash.clone();
    let blob = tokio::task::spawn_blocking(move || cache.read_blob(&blob_hash, gzip))
        .await
        .map_err(|e| ServerError::internal(format!("blob task: {e}")))??
        .ok_or_else(|| ServerError::internal(format!("missing blob {hash}")))?;

    Ok((StatusCode::OK, response_headers, blob.bytes).into_response())
}

fn format_url(id: &str, format: &str) -> String {
    if format.is_empty() {
        format!("/v1/{id}")
    } else {
        format!("/v1/{id}/{format}")
    }
}

fn redirect(mut headers: HeaderMap, location: &str) -> Response {
    headers.insert(header::LOCATION, location.parse().expect("header"));
    headers.insert(header::CONTENT_LENGTH, "0".parse().expect("header"));
    (StatusCode::TEMPORARY_REDIRECT, headers).into_response()
}
