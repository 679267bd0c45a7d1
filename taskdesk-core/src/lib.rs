//! taskdesk Core - Entity Types
//!
//! Pure data structures shared by the storage and API crates.
//! This crate contains ONLY data types - no I/O.

pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use entities::{
    AgentCredential, Attachment, AuditEntry, Document, Event, IdempotencyRecord, Task,
    REQUEST_ERROR_ACTION,
};
pub use enums::{
    ActionKind, EntityType, ScheduleBucket, TaskStatus, DEFAULT_PRIORITY, MAX_PRIORITY,
    MIN_PRIORITY,
};
pub use error::{ConfigError, StorageError, StorageResult, TaskdeskError, TaskdeskResult};
pub use identity::{
    compute_content_hash, content_hash_hex, new_entity_id, ContentHash, EntityId, PreviewId,
    RefTarget, Timestamp, PREVIEW_ID_PREFIX,
};
