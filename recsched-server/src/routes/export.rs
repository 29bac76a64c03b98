//! `GET /export/...`: rendered dataset exports and their schemas.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::{Result, ServerError};
use crate::negotiate::none_match;
use crate::state::AppState;

pub async fn schema_json(State(state): State<Arc<AppState>>) -> Response {
    (
        [(
            header::CONTENT_TYPE,
            "application/schema+json; charset=utf-8",
        )],
        state.schema_json.clone(),
    )
        .into_response()
}

pub async fn schema_csv(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        state.schema_csv.clone(),
    )
        .into_response()
}

/// Which export document a filename asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Json,
    CsvZip,
}

impl Kind {
    fn suffix(self) -> &'static str {
        match self {
            Kind::Json => ".json",
            Kind::CsvZip => ".csv.zip",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            Kind::Json => "application/json",
            Kind::CsvZip => "application/zip",
        }
    }
}

fn split_file(file: &str) -> Option<(&str, Kind)> {
    if let Some(spec) = file.strip_suffix(".csv.zip") {
        return Some((spec, Kind::CsvZip));
    }
    if let Some(spec) = file.strip_suffix(".json") {
        return Some((spec, Kind::Json));
    }
    None
}

pub async fn serve(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let Some((spec, kind)) = split_file(&file) else {
        return Err(ServerError::not_found("not found"));
    };

    let entry = state
        .exports
        .resolve(spec)
        .await?
        .ok_or_else(|| ServerError::not_found(format!("no data found for {spec:?}")))?;

    // redirect to the canonical URL for cacheability, except for
    // latest-relative specs where refreshing must keep tracking latest
    if !spec.starts_with("latest") && spec != entry.id() {
        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CACHE_CONTROL,
            "public, max-age=60".parse().expect("header"),
        );
        response_headers.insert(
            header::LOCATION,
            format!("/export/{}{}", entry.id(), kind.suffix())
                .parse()
                .expect("header"),
        );
        response_headers.insert(header::CONTENT_LENGTH, "0".parse().expect("header"));
        return Ok((StatusCode::TEMPORARY_REDIRECT, response_headers).into_response());
    }

    let output = entry.wait().await?;
    let (bytes, etag) = match kind {
        Kind::Json => (&output.json, &output.json_etag),
        Kind::CsvZip => (&output.csv_zip, &output.csv_etag),
    };

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CACHE_CONTROL,
        "public, no-cache".parse().expect("header"),
    );
    response_headers.insert(header::ETAG, etag.parse().expect("header"));
    response_headers.insert(
        header::CONTENT_TYPE,
        kind.content_type().parse().expect("header"),
    );
    if none_match(&headers, etag) {
        return Ok((StatusCode::NOT_MODIFIED, response_headers).into_response());
    }
    Ok((StatusCode::OK, response_headers, bytes.clone()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_file() {
        assert_eq!(split_file("latest.json"), Some(("latest", Kind::Json)));
        assert_eq!(
            split_file("latest-2.csv.zip"),
            Some(("latest-2", Kind::CsvZip))
        );
        assert_eq!(split_file("2025-10.json"), Some(("2025-10", Kind::Json)));
        // .csv.zip wins over .json-style suffix confusion
        assert_eq!(split_file("x.csv.zip"), Some(("x", Kind::CsvZip)));
        assert_eq!(split_file("plain.csv"), None);
        assert_eq!(split_file("noext"), None);
    }
}
