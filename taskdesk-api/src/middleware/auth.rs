//! Axum Middleware for Agent Authentication
//!
//! This module provides Axum middleware that:
//! - Reads the `Authorization` / `X-Agent-Token` credential headers
//! - Resolves the agent through the configured [`AgentDirectory`]
//! - Injects AuthContext into request extensions
//! - Returns 401 for unauthenticated requests

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use taskdesk_storage::AgentDirectory;

use crate::auth::{authenticate, AuthContext};
use crate::constants::AGENT_TOKEN_HEADER;
use crate::error::{ApiError, ApiResult};

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for authentication middleware.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub directory: Arc<dyn AgentDirectory>,
}

impl AuthMiddlewareState {
    pub fn new(directory: Arc<dyn AgentDirectory>) -> Self {
        Self { directory }
    }
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Axum middleware for agent authentication.
///
/// ```ignore
/// use axum::{Router, middleware};
/// use taskdesk_api::middleware::{auth_middleware, AuthMiddlewareState};
///
/// let auth_state = AuthMiddlewareState::new(directory);
///
/// let app = Router::new()
///     .route("/api/v1/agent/actions", axum::routing::post(handler))
///     .layer(middleware::from_fn_with_state(auth_state, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let agent_token_header = request
        .headers()
        .get(AGENT_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok());

    let auth_context = authenticate(state.directory.as_ref(), auth_header, agent_token_header)
        .await
        .map_err(AuthMiddlewareError)?;

    tracing::debug!(agent_id = %auth_context.agent_id, agent = %auth_context.name, "Agent authenticated");

    request.extensions_mut().insert(auth_context);
    Ok(next.run(request).await)
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Error wrapper for middleware that implements IntoResponse.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

/// Extractor for the AuthContext injected by [`auth_middleware`].
///
/// If the middleware is not applied the extractor fails with a 500.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = AuthMiddlewareError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                AuthMiddlewareError(ApiError::internal_error(
                    "AuthContext not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                ))
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Extract AuthContext from request extensions.
pub fn extract_auth_context(request: &Request) -> ApiResult<&AuthContext> {
    request
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| ApiError::unauthorized("Authentication context not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use taskdesk_storage::InMemoryAgentDirectory;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let directory = InMemoryAgentDirectory::new();
        directory.register("planner", "tok-1", ["tasks:write"]).await;
        let state = AuthMiddlewareState::new(Arc::new(directory));

        Router::new()
            .route(
                "/whoami",
                get(|AuthExtractor(auth): AuthExtractor| async move { auth.name }),
            )
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }

    #[tokio::test]
    async fn test_valid_bearer_token_passes() {
        let response = test_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header("authorization", "Bearer tok-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_agent_token_header_passes() {
        let response = test_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header("x-agent-token", "tok-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_credential_is_401() {
        let response = test_app()
            .await
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_token_is_401() {
        let response = test_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header("authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
