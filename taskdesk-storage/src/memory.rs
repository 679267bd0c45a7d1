//! In-memory store used by tests and by `TASKDESK_STORE=memory`.
//!
//! A transaction takes the store's mutex for its whole lifetime and works on
//! a private copy of the state. Commit swaps the copy in; rollback or drop
//! throws it away. Writers are therefore fully serialized.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ::async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use taskdesk_core::{
    content_hash_hex, new_entity_id, AgentCredential, Attachment, AuditEntry, Document, EntityId,
    EntityType, Event, IdempotencyRecord, StorageError, StorageResult, Task,
};

use crate::{
    ActionStore, AgentDirectory, DocumentUpdate, StorageStatistics, StoreTransaction, TaskUpdate,
};

/// Committed contents of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryState {
    pub tasks: HashMap<EntityId, Task>,
    pub documents: HashMap<EntityId, Document>,
    pub events: HashMap<EntityId, Event>,
    pub attachments: HashMap<EntityId, Attachment>,
    pub audit_log: Vec<AuditEntry>,
    pub idempotency: HashMap<(EntityId, String), IdempotencyRecord>,
}

impl MemoryState {
    pub fn statistics(&self) -> StorageStatistics {
        StorageStatistics {
            tasks: self.tasks.len(),
            documents: self.documents.len(),
            events: self.events.len(),
            attachments: self.attachments.len(),
            audit_entries: self.audit_log.len(),
            idempotency_records: self.idempotency.len(),
        }
    }

    fn check_document_exists(&self, doc_id: Option<EntityId>, constraint: &str) -> StorageResult<()> {
        match doc_id {
            Some(id) if !self.documents.contains_key(&id) => {
                Err(StorageError::ConstraintViolation {
                    constraint: constraint.to_string(),
                    reason: format!("document {} does not exist", id),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct FaultFlags {
    fail_audit_append: AtomicBool,
    fail_commit: AtomicBool,
    conflict_on_commit: AtomicBool,
}

/// Mutex-guarded in-memory [`ActionStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultFlags>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make the out-of-band [`ActionStore::audit_append`] fail.
    pub fn set_fail_audit_append(&self, fail: bool) {
        self.faults.fail_audit_append.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent commit fail after the transaction has run.
    pub fn set_fail_commit(&self, fail: bool) {
        self.faults.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent commit lose a serialization conflict, the way a
    /// SERIALIZABLE database transaction does against a concurrent writer.
    pub fn set_conflict_on_commit(&self, conflict: bool) {
        self.faults.conflict_on_commit.store(conflict, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActionStore for InMemoryStore {
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        // Let concurrent batches get as far as their ledger lookup first.
        tokio::task::yield_now().await;
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn idempotency_get(
        &self,
        caller_id: EntityId,
        key: &str,
    ) -> StorageResult<Option<IdempotencyRecord>> {
        let state = self.state.lock().await;
        Ok(state.idempotency.get(&(caller_id, key.to_string())).cloned())
    }

    async fn audit_append(&self, entry: &AuditEntry) -> StorageResult<()> {
        if self.faults.fail_audit_append.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "audit log unavailable".to_string(),
            });
        }
        self.state.lock().await.audit_log.push(entry.clone());
        Ok(())
    }

    async fn task_get(&self, id: EntityId) -> StorageResult<Option<Task>> {
        Ok(self.state.lock().await.tasks.get(&id).cloned())
    }

    async fn document_get(&self, id: EntityId) -> StorageResult<Option<Document>> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn event_get(&self, id: EntityId) -> StorageResult<Option<Event>> {
        Ok(self.state.lock().await.events.get(&id).cloned())
    }

    async fn attachment_get(&self, id: EntityId) -> StorageResult<Option<Attachment>> {
        Ok(self.state.lock().await.attachments.get(&id).cloned())
    }

    async fn audit_list(&self, caller_id: EntityId) -> StorageResult<Vec<AuditEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .audit_log
            .iter()
            .filter(|e| e.caller_id == caller_id)
            .cloned()
            .collect())
    }

    async fn statistics(&self) -> StorageResult<StorageStatistics> {
        Ok(self.state.lock().await.statistics())
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: Arc<FaultFlags>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn task_get(&mut self, id: EntityId) -> StorageResult<Option<Task>> {
        Ok(self.working.tasks.get(&id).cloned())
    }

    async fn document_get(&mut self, id: EntityId) -> StorageResult<Option<Document>> {
        Ok(self.working.documents.get(&id).cloned())
    }

    async fn task_insert(&mut self, task: &Task) -> StorageResult<()> {
        if self.working.tasks.contains_key(&task.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Task,
                reason: "already exists".to_string(),
            });
        }
        self.working.check_document_exists(task.doc_id, "tasks_doc_id_fkey")?;
        self.working.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn task_update(&mut self, id: EntityId, update: &TaskUpdate) -> StorageResult<Task> {
        if !self.working.tasks.contains_key(&id) {
            return Err(StorageError::NotFound {
                entity_type: EntityType::Task,
                id,
            });
        }
        if let Some(doc_id) = update.doc_id {
            self.working.check_document_exists(doc_id, "tasks_doc_id_fkey")?;
        }
        let task = self
            .working
            .tasks
            .get_mut(&id)
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Task,
                id,
            })?;
        update.apply_to(task, Utc::now());
        Ok(task.clone())
    }

    async fn document_insert(&mut self, doc: &Document) -> StorageResult<()> {
        if self.working.documents.contains_key(&doc.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Document,
                reason: "already exists".to_string(),
            });
        }
        self.working.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn document_update(
        &mut self,
        id: EntityId,
        update: &DocumentUpdate,
    ) -> StorageResult<Document> {
        let doc = self
            .working
            .documents
            .get_mut(&id)
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Document,
                id,
            })?;
        update.apply_to(doc, Utc::now());
        Ok(doc.clone())
    }

    async fn event_insert(&mut self, event: &Event) -> StorageResult<()> {
        if self.working.events.contains_key(&event.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Event,
                reason: "already exists".to_string(),
            });
        }
        self.working.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn attachment_insert(&mut self, attachment: &Attachment) -> StorageResult<()> {
        if let Some(task_id) = attachment.task_id {
            if !self.working.tasks.contains_key(&task_id) {
                return Err(StorageError::ConstraintViolation {
                    constraint: "attachments_task_id_fkey".to_string(),
                    reason: format!("task {} does not exist", task_id),
                });
            }
        }
        self.working
            .check_document_exists(attachment.doc_id, "attachments_doc_id_fkey")?;
        self.working
            .attachments
            .insert(attachment.id, attachment.clone());
        Ok(())
    }

    async fn audit_append(&mut self, entry: &AuditEntry) -> StorageResult<()> {
        self.working.audit_log.push(entry.clone());
        Ok(())
    }

    async fn idempotency_insert(&mut self, record: &IdempotencyRecord) -> StorageResult<()> {
        let key = (record.caller_id, record.key.clone());
        if self.working.idempotency.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                key: record.key.clone(),
            });
        }
        self.working.idempotency.insert(key, record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::TransactionFailed {
                reason: "commit rejected".to_string(),
            });
        }
        if self.faults.conflict_on_commit.load(Ordering::SeqCst) {
            return Err(StorageError::SerializationConflict {
                reason: "could not serialize access due to concurrent update".to_string(),
            });
        }
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

// ============================================================================
// AGENT DIRECTORY
// ============================================================================

/// Agent credentials held in memory, keyed by token hash.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentDirectory {
    agents: Arc<RwLock<HashMap<String, AgentCredential>>>,
}

impl InMemoryAgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent and return its credential. Only the token hash is kept.
    pub async fn register<I, S>(&self, name: &str, token: &str, scopes: I) -> AgentCredential
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credential = AgentCredential {
            agent_id: new_entity_id(),
            name: name.to_string(),
            token_hash: content_hash_hex(token.as_bytes()),
            scopes: scopes.into_iter().map(Into::into).collect(),
            revoked: false,
        };
        self.insert(credential.clone()).await;
        credential
    }

    pub async fn insert(&self, credential: AgentCredential) {
        self.agents
            .write()
            .await
            .insert(credential.token_hash.clone(), credential);
    }

    /// Mark the agent holding `token` as revoked.
    pub async fn revoke(&self, token: &str) -> bool {
        let hash = content_hash_hex(token.as_bytes());
        match self.agents.write().await.get_mut(&hash) {
            Some(agent) => {
                agent.revoked = true;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

#[async_trait]
impl AgentDirectory for InMemoryAgentDirectory {
    async fn find_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<AgentCredential>> {
        Ok(self.agents.read().await.get(token_hash).cloned())
    }
}
