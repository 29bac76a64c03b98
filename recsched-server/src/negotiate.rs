//! Content-encoding negotiation and weak ETags.

use axum::http::{header, HeaderMap};
use recsched_core::ContentHash;

/// True if the request accepts gzip content coding. Identity remains the
/// fallback whenever gzip is absent or disqualified with `q=0`.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|entry| {
            let mut parts = entry.split(';');
            let coding = parts.next().unwrap_or("").trim();
            if !coding.eq_ignore_ascii_case("gzip") && coding != "*" {
                return false;
            }
            for param in parts {
                let param = param.trim();
                if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
                    return q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false);
                }
            }
            true
        })
}

/// Weak ETag over a stored content hash, with an optional content-coding
/// suffix: `W/"<hash>[-<coding>]"`.
pub fn blob_etag(hash: &str, coding: Option<&str>) -> String {
    match coding {
        Some(coding) => format!("W/\"{hash}-{coding}\""),
        None => format!("W/\"{hash}\""),
    }
}

/// Weak ETag over the bytes of a rendered document.
pub fn content_etag(bytes: &[u8]) -> String {
    format!("W/\"{}\"", ContentHash::of(bytes))
}

/// True if any `If-None-Match` value matches `etag` exactly (or is `*`).
pub fn none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|candidate| candidate == etag || candidate == "*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn test_accepts_gzip() {
        assert!(!accepts_gzip(&HeaderMap::new()));
        assert!(accepts_gzip(&headers(header::ACCEPT_ENCODING, "gzip")));
        assert!(accepts_gzip(&headers(
            header::ACCEPT_ENCODING,
            "deflate, gzip;q=0.5"
        )));
        assert!(accepts_gzip(&headers(header::ACCEPT_ENCODING, "*")));
        assert!(!accepts_gzip(&headers(header::ACCEPT_ENCODING, "identity")));
        assert!(!accepts_gzip(&headers(
            header::ACCEPT_ENCODING,
            "gzip;q=0"
        )));
        assert!(!accepts_gzip(&headers(
            header::ACCEPT_ENCODING,
            "gzip;q=0.0, deflate"
        )));
    }

    #[test]
    fn test_etag_formats() {
        assert_eq!(blob_etag("ABC", None), "W/\"ABC\"");
        assert_eq!(blob_etag("ABC", Some("gzip")), "W/\"ABC-gzip\"");
        let etag = content_etag(b"payload");
        assert!(etag.starts_with("W/\""));
        assert!(etag.ends_with('"'));
        // deterministic across calls
        assert_eq!(etag, content_etag(b"payload"));
    }

    #[test]
    fn test_none_match() {
        let etag = "W/\"ABC-gzip\"";
        assert!(none_match(
            &headers(header::IF_NONE_MATCH, "W/\"ABC-gzip\""),
            etag
        ));
        assert!(none_match(
            &headers(header::IF_NONE_MATCH, "W/\"X\", W/\"ABC-gzip\""),
            etag
        ));
        assert!(none_match(&headers(header::IF_NONE_MATCH, "*"), etag));
        assert!(!none_match(
            &headers(header::IF_NONE_MATCH, "W/\"ABC\""),
            etag
        ));
        assert!(!none_match(&HeaderMap::new(), etag));
    }
}
