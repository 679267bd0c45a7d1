//! taskdesk API - Agent Batch-Action Layer
//!
//! This crate exposes `POST /api/v1/agent/actions`, through which automated
//! agents submit batches of mutating actions against tasks, documents,
//! events and attachments. A batch is validated, authorized, and then either
//! committed atomically or previewed without side effects.
//!
//! Real batches support idempotent retries through the `Idempotency-Key`
//! header, and every committed action is written to an append-only audit log.

pub mod actions;
pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use actions::{
    authorize_batch, validate_batch, Action, ActionRequest, ActionResult, Batch,
    BatchExecutor, ExecutionError, ReferenceMap,
};
pub use auth::{authenticate, AuthConfig, AuthContext, StaticAgent};
pub use config::{ApiConfig, StoreKind};
pub use db::{DbConfig, PgAgentDirectory, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode, FieldError};
pub use middleware::{auth_middleware, extract_auth_context, AuthExtractor, AuthMiddlewareState};
pub use routes::create_api_router;
pub use state::AppState;
