//! Constants for taskdesk API
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// BATCH LIMITS
// ============================================================================

/// Maximum number of actions allowed in a single batch request
pub const MAX_BATCH_ACTIONS: usize = 200;

/// Default request body limit (2 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Maximum length of a `saveAs` alias
pub const MAX_ALIAS_LEN: usize = 64;

/// Maximum length of a task or document title
pub const MAX_TITLE_LEN: usize = 500;

// ============================================================================
// IDEMPOTENCY
// ============================================================================

/// Header carrying the caller's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Header set on responses replayed from the ledger
pub const IDEMPOTENCY_REPLAYED_HEADER: &str = "idempotency-replayed";

/// Maximum idempotency key length
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Alternative credential header for agents that cannot set Authorization
pub const AGENT_TOKEN_HEADER: &str = "x-agent-token";

/// Scope that grants every capability
pub const WILDCARD_SCOPE: &str = "*";

// ============================================================================
// DEFAULTS
// ============================================================================

/// Workspace assigned to tasks and documents that do not name one
pub const DEFAULT_WORKSPACE: &str = "personal";

/// MIME type assigned to attachments that do not name one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// ============================================================================
// SERVER
// ============================================================================

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Path of the batch action endpoint
pub const AGENT_ACTIONS_PATH: &str = "/api/v1/agent/actions";
