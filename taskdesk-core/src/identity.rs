//! Identity types for taskdesk entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Prefix carried by every identifier minted during a dry run.
pub const PREVIEW_ID_PREFIX: &str = "preview_";

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Hex-encoded SHA-256 of content.
pub fn content_hash_hex(content: &[u8]) -> String {
    hex::encode(compute_content_hash(content))
}

/// Identifier minted for an entity that a dry run would create.
///
/// Always rendered as `preview_<32 hex>`, which never parses as a UUID, so a
/// preview id handed back to the API as a literal reference is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewId(String);

impl PreviewId {
    /// Mint a fresh preview identifier.
    pub fn generate() -> Self {
        Self(format!("{}{}", PREVIEW_ID_PREFIX, Uuid::now_v7().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw identifier string was minted by a dry run.
    pub fn is_preview(raw: &str) -> bool {
        raw.starts_with(PREVIEW_ID_PREFIX)
    }
}

impl fmt::Display for PreviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identifier a batch-local alias is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefTarget {
    /// A row that exists (or will exist once the transaction commits).
    Stored(EntityId),
    /// A synthetic identifier produced by a dry run.
    Preview(PreviewId),
}

impl RefTarget {
    /// The stored id, if this target refers to a real row.
    pub fn stored(&self) -> Option<EntityId> {
        match self {
            RefTarget::Stored(id) => Some(*id),
            RefTarget::Preview(_) => None,
        }
    }

    pub fn is_preview(&self) -> bool {
        matches!(self, RefTarget::Preview(_))
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Stored(id) => write!(f, "{}", id),
            RefTarget::Preview(id) => write!(f, "{}", id),
        }
    }
}

impl From<EntityId> for RefTarget {
    fn from(id: EntityId) -> Self {
        RefTarget::Stored(id)
    }
}

impl From<PreviewId> for RefTarget {
    fn from(id: PreviewId) -> Self {
        RefTarget::Preview(id)
    }
}
