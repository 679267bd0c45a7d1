//! Middleware modules for taskdesk API
//!
//! - `auth`: resolves the calling agent and injects [`crate::auth::AuthContext`]

mod auth;

pub use auth::{
    auth_middleware, extract_auth_context, AuthExtractor, AuthMiddlewareError,
    AuthMiddlewareState,
};
