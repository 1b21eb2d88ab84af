//! Error types for the delta sync server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::sync::EntityKind;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised by the sync engine and its HTTP surface
#[derive(Error, Debug)]
pub enum SyncError {
    /// An incoming record is older than the one already stored under its id.
    #[error("Conflict on {kind} {id}: incoming changed_ts {incoming_ts} is older than stored {stored_ts}")]
    Conflict {
        kind: EntityKind,
        id: String,
        incoming_ts: i64,
        stored_ts: i64,
    },

    #[error("Malformed change set: {0}")]
    MalformedChangeSet(String),

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl SyncError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedChangeSet(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored payload could not be decoded: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            SyncError::Conflict { kind, id, .. } => {
                tracing::warn!("Rejected sync: {}", self);
                (
                    StatusCode::CONFLICT,
                    "conflict",
                    format!("A newer version of {} {} already exists", kind, id),
                )
            }
            SyncError::MalformedChangeSet(msg) => {
                (StatusCode::BAD_REQUEST, "malformed_change_set", msg.clone())
            }
            SyncError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            SyncError::StoreUnavailable(e) => {
                tracing::error!("Store error: {}", e);
                match e {
                    StoreError::Database(_) => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "store_unavailable",
                        "Record store unavailable, retry later".to_string(),
                    ),
                    StoreError::Payload(_) => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "store_corrupt",
                        "Stored document could not be decoded".to_string(),
                    ),
                }
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let conflict = SyncError::Conflict {
            kind: EntityKind::Item,
            id: "A".to_string(),
            incoming_ts: 90,
            stored_ts: 100,
        };
        assert!(conflict.is_conflict());
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        let malformed = SyncError::malformed("missing id");
        assert!(!malformed.is_conflict());
        assert_eq!(malformed.into_response().status(), StatusCode::BAD_REQUEST);

        let unavailable = SyncError::from(StoreError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_conflict_message() {
        let conflict = SyncError::Conflict {
            kind: EntityKind::Tag,
            id: "t-1".to_string(),
            incoming_ts: 5,
            stored_ts: 7,
        };
        assert_eq!(
            conflict.to_string(),
            "Conflict on tag t-1: incoming changed_ts 5 is older than stored 7"
        );
    }
}
