//! REST API Routes Module
//!
//! Includes:
//! - The agent batch-action endpoint (authenticated)
//! - Prometheus metrics

pub mod actions;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::constants::AGENT_ACTIONS_PATH;
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;
use crate::telemetry::metrics_handler;

pub use actions::post_actions;

/// Create the full API router.
///
/// The action endpoint sits behind the authentication middleware and the
/// configured body limit; `/metrics` is public.
pub fn create_api_router(state: AppState) -> Router {
    let auth_state = AuthMiddlewareState::new(state.directory.clone());

    let agent_routes = Router::new()
        .route(AGENT_ACTIONS_PATH, post(post_actions))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .route_layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .merge(agent_routes)
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use taskdesk_storage::{InMemoryAgentDirectory, InMemoryStore};
    use tower::ServiceExt;

    fn router() -> Router {
        let state = AppState::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryAgentDirectory::new()),
            ApiConfig::default(),
        );
        create_api_router(state)
    }

    #[tokio::test]
    async fn test_actions_requires_credentials() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(AGENT_ACTIONS_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"actions":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_metrics_is_public() {
        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
