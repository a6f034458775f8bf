//! Health and admin endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use strata_gc::GarbageCollectorInfo;
use strata_storage::{LifecycleState, ProviderDescription, PruneReport};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub root_provider: String,
}

/// GET /v1/health - Storage and metadata health.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    state.store.health_check().await?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        root_provider: state.store.chain().root().id().to_string(),
    }))
}

/// GC status response.
#[derive(Debug, Serialize)]
pub struct GcStatusResponse {
    pub running: bool,
    pub paused: bool,
    pub last_run: Option<GarbageCollectorInfo>,
}

fn gc_status(state: &AppState) -> GcStatusResponse {
    GcStatusResponse {
        running: state.gc.is_running(),
        paused: state.gc.control().is_paused(),
        last_run: state.gc.last_info(),
    }
}

/// POST /v1/admin/gc - Start a GC run in the background.
pub async fn trigger_gc(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<GcStatusResponse>)> {
    if state.gc.is_running() {
        return Err(ApiError::Conflict(
            "garbage collection is already running".to_string(),
        ));
    }

    let gc = state.gc.clone();
    tokio::spawn(async move {
        if gc.run().await.is_none() {
            tracing::debug!("manual garbage collection raced another run");
        }
    });
    tracing::info!("manual garbage collection triggered");

    let mut status = gc_status(&state);
    status.running = true;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// GET /v1/admin/gc - Current state and the last run's report.
pub async fn get_gc(State(state): State<AppState>) -> Json<GcStatusResponse> {
    Json(gc_status(&state))
}

/// POST /v1/admin/gc/pause
pub async fn pause_gc(State(state): State<AppState>) -> Json<GcStatusResponse> {
    state.gc.control().pause();
    Json(gc_status(&state))
}

/// POST /v1/admin/gc/resume
pub async fn resume_gc(State(state): State<AppState>) -> Json<GcStatusResponse> {
    state.gc.control().resume();
    Json(gc_status(&state))
}

/// POST /v1/admin/gc/stop
pub async fn stop_gc(State(state): State<AppState>) -> Json<GcStatusResponse> {
    state.gc.control().stop();
    Json(gc_status(&state))
}

/// POST /v1/admin/prune - Remove abandoned temp files from every provider.
pub async fn prune(State(state): State<AppState>) -> ApiResult<Json<PruneReport>> {
    Ok(Json(state.store.prune().await?))
}

/// Chain description response.
#[derive(Debug, Serialize)]
pub struct ChainResponse {
    pub state: LifecycleState,
    pub root: String,
    pub providers: Vec<ProviderDescription>,
}

/// GET /v1/admin/chain - The active provider chain, root first.
pub async fn get_chain(State(state): State<AppState>) -> Json<ChainResponse> {
    let chain = state.store.chain();
    Json(ChainResponse {
        state: chain.state(),
        root: chain.root().id().to_string(),
        providers: chain.describe(),
    })
}
