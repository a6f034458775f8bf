//! Artifact endpoints: a logical path pointing at one binary.

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::{
    binary_response, body_stream, declared_length, normalize_path, required_checksum,
};
use crate::metrics::{BINARIES_ADDED, BYTES_ADDED, CHECKSUM_MISMATCHES};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use strata_core::BinaryData;
use strata_storage::StorageError;

/// PUT /v1/artifacts/{*path} - Store a binary and point `path` at it.
///
/// The body is streamed into the store and verified against the
/// `X-Checksum-Sha1` header before the reference is recorded.
pub async fn put_artifact(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<(StatusCode, Json<BinaryData>)> {
    let path = normalize_path(&path)?;
    let checksum = required_checksum(&headers)?;
    let length = declared_length(&headers);

    // The claim keeps garbage collection off the binary until the
    // reference below is committed.
    let (binary, _pinned) = match state
        .store
        .add_pinned(&checksum, body_stream(body), length)
        .await
    {
        Ok(added) => added,
        Err(e @ StorageError::ChecksumMismatch { .. }) => {
            CHECKSUM_MISMATCHES.inc();
            tracing::warn!(path = %path, checksum = %checksum, error = %e, "rejected upload");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    BINARIES_ADDED.inc();
    BYTES_ADDED.inc_by(binary.length);

    state.metadata.put_artifact(&path, &checksum).await?;
    tracing::info!(path = %path, checksum = %checksum, length = binary.length, "artifact stored");

    Ok((StatusCode::CREATED, Json(binary)))
}

/// GET /v1/artifacts/{*path} - Stream the binary an artifact points at.
pub async fn get_artifact(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<Response> {
    let path = normalize_path(&path)?;
    let artifact = state
        .metadata
        .get_artifact(&path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("artifact not found: {path}")))?;

    let checksum = artifact.checksum;
    let stream = state.store.get(&checksum).await?.ok_or_else(|| {
        tracing::error!(path = %path, checksum = %checksum, "artifact references a missing binary");
        ApiError::NotFound(format!("binary {checksum} for artifact {path} is missing"))
    })?;
    let length = state
        .metadata
        .get_binary(&checksum)
        .await?
        .map(|binary| binary.length);

    Ok(binary_response(&checksum, stream, length))
}

/// DELETE /v1/artifacts/{*path} - Drop the reference.
///
/// The binary stays in the store until garbage collection finds it
/// unreferenced.
pub async fn delete_artifact(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> ApiResult<StatusCode> {
    let path = normalize_path(&path)?;
    if !state.metadata.delete_artifact(&path).await? {
        return Err(ApiError::NotFound(format!("artifact not found: {path}")));
    }
    tracing::info!(path = %path, "artifact deleted");
    Ok(StatusCode::NO_CONTENT)
}
