//! Sync API endpoints
//!
//! Delta sync plus the bulk replace / wipe / export primitives.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{Result, SyncError};
use crate::state::AppState;
use crate::sync::{RawSnapshot, Snapshot, SyncRequest, SyncResponse};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_changes))
        .route(
            "/sync/all",
            get(export_all).put(replace_all).delete(wipe_all),
        )
        .route("/time", get(server_time))
}

/// Push local changes and pull the delta
async fn sync_changes(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>> {
    let Json(request) = payload.map_err(|e| SyncError::malformed(e.body_text()))?;
    let response = state.sync().sync(request).await?;
    Ok(Json(response))
}

/// Replace every collection with the request body
async fn replace_all(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RawSnapshot>, JsonRejection>,
) -> Result<StatusCode> {
    let Json(snapshot) = payload.map_err(|e| SyncError::malformed(e.body_text()))?;
    state.sync().replace_all(snapshot).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete every item, tag and tombstone
async fn wipe_all(State(state): State<AppState>) -> Result<StatusCode> {
    state.sync().wipe().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dump every collection
async fn export_all(State(state): State<AppState>) -> Result<Json<Snapshot>> {
    Ok(Json(state.sync().export().await?))
}

#[derive(Debug, Serialize)]
pub struct TimeResponse {
    pub server_time_ms: i64,
}

/// Server clock, so clients can estimate their skew
async fn server_time(State(state): State<AppState>) -> Json<TimeResponse> {
    Json(TimeResponse {
        server_time_ms: state.sync().server_time_ms(),
    })
}
