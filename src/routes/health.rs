//! Health check endpoint

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    /// Whether the record store accepted a unit of work
    pub store: &'static str,
    pub timestamp: i64,
}

/// Liveness plus record store reachability; 503 while the store is down
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, store) = match state.sync().check_store().await {
        Ok(()) => (StatusCode::OK, "healthy", "ok"),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable")
        }
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            service: "delta-sync-server",
            store,
            timestamp: Utc::now().timestamp(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::Config;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, Store, StoreResult, UnitOfWork};

    struct UnreachableStore;

    #[async_trait]
    impl Store for UnreachableStore {
        async fn begin<'a>(&'a self) -> StoreResult<Box<dyn UnitOfWork + 'a>> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_healthy_store() {
        let state = AppState::new(Config::default(), Arc::new(MemoryStore::new()));
        let (code, Json(body)) = health_check(State(state)).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.store, "ok");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_degraded() {
        let state = AppState::new(Config::default(), Arc::new(UnreachableStore));
        let (code, Json(body)) = health_check(State(state)).await;

        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.store, "unavailable");
    }
}
