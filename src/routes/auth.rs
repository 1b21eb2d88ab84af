//! API key check for the sync endpoints

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// Reject requests that do not carry the configured key
///
/// The key is accepted from the `x-api-key` header or the `key` query parameter.
/// Without a configured key every request passes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let Some(expected) = state.config().auth.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            Query::<KeyQuery>::try_from_uri(request.uri())
                .ok()
                .and_then(|Query(query)| query.key)
        });

    if provided.as_deref() != Some(expected) {
        tracing::debug!("Wrong authentication key for {}", request.uri().path());
        return Err(SyncError::Unauthorized("invalid or missing API key".to_string()));
    }

    Ok(next.run(request).await)
}
