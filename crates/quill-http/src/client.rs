// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared reqwest client construction and response helpers.

use std::time::Duration;

use quill_core::QuillError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

/// Builds a client with JSON content type and an optional bearer token.
///
/// `timeout` bounds a whole request including the body; pass `None` for
/// long-lived streams, which then only get a connect timeout.
pub fn build_client(
    api_key: Option<&str>,
    timeout: Option<Duration>,
) -> Result<reqwest::Client, QuillError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(key) = api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| QuillError::Config(format!("invalid API key header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| QuillError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Maps a transport failure, keeping timeouts distinct.
pub fn transport_error(e: reqwest::Error, timeout: Option<Duration>) -> QuillError {
    if e.is_timeout()
        && let Some(duration) = timeout
    {
        return QuillError::Timeout { duration };
    }
    QuillError::Generation {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Reads an error body for diagnostics, truncated to keep logs readable.
pub async fn error_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > 512 {
        let mut cut = 512;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Joins a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_transient_status(reqwest::StatusCode::from_u16(code).unwrap()));
        }
        for code in [400, 401, 404, 422] {
            assert!(!is_transient_status(reqwest::StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://h:1/", "/v1/jobs"), "http://h:1/v1/jobs");
        assert_eq!(join_url("http://h:1", "v1/jobs"), "http://h:1/v1/jobs");
    }

    #[test]
    fn bad_api_key_is_a_config_error() {
        let err = build_client(Some("bad\nkey"), None).unwrap_err();
        assert!(matches!(err, QuillError::Config(_)));
    }
}
