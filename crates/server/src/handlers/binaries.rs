//! Direct access to binaries by checksum.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{CHECKSUM_HEADER, binary_response, parse_checksum};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// GET /v1/binaries/{sha1} - Stream a binary.
pub async fn get_binary(
    State(state): State<AppState>,
    Path(sha1): Path<String>,
) -> ApiResult<Response> {
    let checksum = parse_checksum(&sha1)?;
    let stream = state
        .store
        .get(&checksum)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("binary not found: {checksum}")))?;
    let length = state
        .metadata
        .get_binary(&checksum)
        .await?
        .map(|binary| binary.length);
    Ok(binary_response(&checksum, stream, length))
}

/// HEAD /v1/binaries/{sha1} - Check whether the chain holds a binary.
pub async fn head_binary(
    State(state): State<AppState>,
    Path(sha1): Path<String>,
) -> ApiResult<Response> {
    let checksum = parse_checksum(&sha1)?;
    if !state.store.exists(&checksum).await? {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    let mut response = StatusCode::OK.into_response();
    if let Ok(value) = HeaderValue::from_str(&checksum.to_hex()) {
        response.headers_mut().insert(CHECKSUM_HEADER, value);
    }
    if let Some(binary) = state.metadata.get_binary(&checksum).await? {
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(binary.length));
    }
    Ok(response)
}
