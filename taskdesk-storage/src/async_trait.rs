//! Async storage traits for the agent action pipeline.
//!
//! `ActionStore` is the durable backing store; `StoreTransaction` is one
//! all-or-nothing unit of work opened on it. Every mutation the executor
//! performs goes through a transaction. Reads and the out-of-band audit
//! write go through the store directly.

use ::async_trait::async_trait;
use serde::Serialize;
use taskdesk_core::{
    AgentCredential, Attachment, AuditEntry, Document, EntityId, Event, IdempotencyRecord,
    StorageResult, Task,
};

use crate::{DocumentUpdate, TaskUpdate};

/// Row counts across every table the pipeline writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageStatistics {
    pub tasks: usize,
    pub documents: usize,
    pub events: usize,
    pub attachments: usize,
    pub audit_entries: usize,
    pub idempotency_records: usize,
}

/// Durable store for tasks, documents, events, attachments, the audit log
/// and the idempotency ledger.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Open a transaction. Implementations serialize writers: no two open
    /// transactions ever observe each other's uncommitted writes.
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>>;

    /// Look up the ledger record for `(caller_id, key)`.
    async fn idempotency_get(
        &self,
        caller_id: EntityId,
        key: &str,
    ) -> StorageResult<Option<IdempotencyRecord>>;

    /// Append an audit entry outside of any transaction.
    async fn audit_append(&self, entry: &AuditEntry) -> StorageResult<()>;

    // ========================================================================
    // READS
    // ========================================================================

    async fn task_get(&self, id: EntityId) -> StorageResult<Option<Task>>;

    async fn document_get(&self, id: EntityId) -> StorageResult<Option<Document>>;

    async fn event_get(&self, id: EntityId) -> StorageResult<Option<Event>>;

    async fn attachment_get(&self, id: EntityId) -> StorageResult<Option<Attachment>>;

    /// Audit entries written on behalf of a caller, oldest first.
    async fn audit_list(&self, caller_id: EntityId) -> StorageResult<Vec<AuditEntry>>;

    async fn statistics(&self) -> StorageResult<StorageStatistics>;
}

/// One open unit of work. Dropping a transaction without calling
/// [`StoreTransaction::commit`] discards every write made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read a task as this transaction sees it.
    async fn task_get(&mut self, id: EntityId) -> StorageResult<Option<Task>>;

    async fn document_get(&mut self, id: EntityId) -> StorageResult<Option<Document>>;

    async fn task_insert(&mut self, task: &Task) -> StorageResult<()>;

    /// Apply a partial update and return the updated row.
    ///
    /// Fails with `StorageError::NotFound` when the row does not exist.
    async fn task_update(&mut self, id: EntityId, update: &TaskUpdate) -> StorageResult<Task>;

    async fn document_insert(&mut self, doc: &Document) -> StorageResult<()>;

    async fn document_update(
        &mut self,
        id: EntityId,
        update: &DocumentUpdate,
    ) -> StorageResult<Document>;

    async fn event_insert(&mut self, event: &Event) -> StorageResult<()>;

    async fn attachment_insert(&mut self, attachment: &Attachment) -> StorageResult<()>;

    async fn audit_append(&mut self, entry: &AuditEntry) -> StorageResult<()>;

    /// Insert a ledger record. Fails with `StorageError::DuplicateKey` if
    /// `(caller_id, key)` already exists, including rows committed by a
    /// concurrent transaction.
    async fn idempotency_insert(&mut self, record: &IdempotencyRecord) -> StorageResult<()>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;

    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Credential lookup for agents calling the action endpoint.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Find the agent whose token hashes to `token_hash`.
    async fn find_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<AgentCredential>>;
}
