//! Route modules for the delta sync server

pub mod auth;
pub mod health;
pub mod sync;

use axum::{middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = sync::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_api_key,
    ));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::store::MemoryStore;

    fn app_with_key(key: Option<&str>) -> Router {
        let mut config = Config::default();
        config.auth.api_key = key.map(str::to_string);
        app(AppState::new(config, Arc::new(MemoryStore::new())))
    }

    async fn status(app: Router, uri: &str, header_key: Option<&str>) -> StatusCode {
        let mut request = Request::builder().uri(uri);
        if let Some(key) = header_key {
            request = request.header(auth::API_KEY_HEADER, key);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_open_without_configured_key() {
        assert_eq!(status(app_with_key(None), "/api/v1/time", None).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_key_required_when_configured() {
        let app = app_with_key(Some("secret"));

        assert_eq!(
            status(app.clone(), "/api/v1/time", None).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(app.clone(), "/api/v1/time?key=wrong", None).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(app.clone(), "/api/v1/time?key=secret", None).await,
            StatusCode::OK
        );
        assert_eq!(
            status(app.clone(), "/api/v1/sync/all", Some("secret")).await,
            StatusCode::OK
        );
        // Health stays public
        assert_eq!(status(app, "/health", None).await, StatusCode::OK);
    }
}
