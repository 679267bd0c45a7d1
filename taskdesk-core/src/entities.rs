//! Entity records written by the agent action pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{EntityId, ScheduleBucket, TaskStatus, Timestamp};

/// A task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    pub workspace: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub schedule_bucket: ScheduleBucket,
    pub priority: i32,
    pub scheduled_date: Option<NaiveDate>,
    /// Document this task was linked to, if any.
    pub doc_id: Option<EntityId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A markdown document row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: EntityId,
    pub title: String,
    pub content_md: String,
    pub workspace: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A calendar event row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EntityId,
    pub title: String,
    pub starts_at: Timestamp,
    pub ends_at: Option<Timestamp>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

/// Attachment metadata. File bytes live outside this system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: EntityId,
    pub task_id: Option<EntityId>,
    pub doc_id: Option<EntityId>,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: Option<String>,
    pub created_at: Timestamp,
}

/// Action kind recorded for a failed batch.
pub const REQUEST_ERROR_ACTION: &str = "request.error";

/// Append-only record of one executed agent action (or one failed request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: EntityId,
    pub caller_id: EntityId,
    /// Wire tag of the action, or `request.error`.
    pub action_kind: String,
    pub payload: serde_json::Value,
    pub result: serde_json::Value,
    pub created_at: Timestamp,
}

/// Stored outcome of a successful real batch, keyed by the caller's token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub caller_id: EntityId,
    /// Hex SHA-256 of the normalized request.
    pub request_hash: String,
    /// Response body bytes exactly as first returned.
    pub response_body: String,
    pub created_at: Timestamp,
}

/// An agent registered to call the batch-action endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCredential {
    pub agent_id: EntityId,
    pub name: String,
    /// Hex SHA-256 of the bearer token. The token itself is never stored.
    pub token_hash: String,
    pub scopes: BTreeSet<String>,
    pub revoked: bool,
}
