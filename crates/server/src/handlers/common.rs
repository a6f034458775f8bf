//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use strata_core::Sha1Checksum;
use strata_storage::{ByteStream, StorageError};

/// Header carrying the hex SHA-1 of an upload or download.
pub const CHECKSUM_HEADER: &str = "x-checksum-sha1";

/// Parse a hex checksum from a path segment or header.
pub fn parse_checksum(raw: &str) -> ApiResult<Sha1Checksum> {
    Sha1Checksum::from_hex(raw.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid checksum: {e}")))
}

/// The declared checksum of an upload.
pub fn required_checksum(headers: &HeaderMap) -> ApiResult<Sha1Checksum> {
    let raw = headers
        .get(CHECKSUM_HEADER)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {CHECKSUM_HEADER} header")))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{CHECKSUM_HEADER} is not valid ASCII")))?;
    parse_checksum(raw)
}

/// The declared body length, if the client sent one.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Adapt a request body into a store stream.
pub fn body_stream(body: Body) -> ByteStream {
    Box::pin(
        body.into_data_stream()
            .map(|chunk| chunk.map_err(|e| StorageError::Io(std::io::Error::other(e)))),
    )
}

/// Stream a binary back to the client.
pub fn binary_response(
    checksum: &Sha1Checksum,
    stream: ByteStream,
    length: Option<u64>,
) -> Response {
    // Errors past this point truncate the response; the client detects
    // them through the length or checksum headers.
    let body_stream =
        stream.map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())));
    let mut response = (StatusCode::OK, Body::from_stream(body_stream)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    if let Ok(value) = HeaderValue::from_str(&checksum.to_hex()) {
        headers.insert(CHECKSUM_HEADER, value);
    }
    if let Some(length) = length {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    response
}

/// Normalize an artifact path: no leading or trailing slashes, no empty,
/// `.` or `..` segments.
pub fn normalize_path(raw: &str) -> ApiResult<String> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("artifact path is empty".to_string()));
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(ApiError::BadRequest(format!(
            "invalid artifact path: {raw}"
        )));
    }
    Ok(trimmed.to_string())
}
