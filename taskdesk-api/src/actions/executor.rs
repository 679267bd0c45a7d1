//! Transactional batch executor.
//!
//! Real batches run inside one store transaction: every action, its audit
//! entry and the idempotency record commit together or not at all. Dry runs
//! walk the same pipeline against read-only lookups and mint preview ids.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use taskdesk_core::{
    new_entity_id, ActionKind, Attachment, Document, EntityId, EntityType, Event, PreviewId,
    RefTarget, StorageError, Task, Timestamp,
};
use taskdesk_storage::{ActionStore, DocumentUpdate, StoreTransaction, TaskUpdate};

use crate::actions::audit;
use crate::actions::idempotency::PendingLedgerEntry;
use crate::actions::resolver::{ReferenceMap, ReferenceMismatch};
use crate::actions::schema::{
    Action, ActionRequest, AttachmentCreate, DocCreate, DocPatch, EventCreate, TaskCreate,
    TaskPatch, UpdateTarget,
};
use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult, ErrorCode, FieldError};

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome of one action, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult {
    pub ok: bool,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub id: RefTarget,
    #[serde(rename = "saveAs", skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub would_write: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noop: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<Vec<String>>,
    pub record: Value,
}

impl ActionResult {
    fn created(kind: ActionKind, id: RefTarget, record: Value) -> Self {
        Self {
            ok: true,
            kind,
            id,
            save_as: None,
            would_write: None,
            noop: None,
            changed: None,
            record,
        }
    }

    fn updated(kind: ActionKind, id: RefTarget, changed: Vec<&'static str>, record: Value) -> Self {
        let noop = changed.is_empty();
        Self {
            noop: noop.then_some(true),
            changed: Some(changed.into_iter().map(str::to_string).collect()),
            ..Self::created(kind, id, record)
        }
    }
}

/// Why a batch did not commit.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// A single action failed; everything before it was rolled back.
    #[error("action {index} ({kind}) failed: {source}")]
    Action {
        index: usize,
        kind: ActionKind,
        #[source]
        source: ApiError,
    },

    /// A concurrent request committed the same idempotency key first.
    #[error("idempotency key was recorded by a concurrent request")]
    LedgerConflict,

    /// Failure outside any single action (begin, render, commit).
    #[error(transparent)]
    Batch(#[from] ApiError),
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Action { source, .. } => source,
            ExecutionError::LedgerConflict => ApiError::from_code(ErrorCode::IdempotencyConflict),
            ExecutionError::Batch(e) => e,
        }
    }
}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        ExecutionError::Batch(err.into())
    }
}

// ============================================================================
// ENTITY BUILDERS
// ============================================================================

fn build_task(create: &TaskCreate, id: EntityId, doc_id: Option<EntityId>, now: Timestamp) -> Task {
    Task {
        id,
        title: create.title.clone(),
        workspace: create.workspace.clone(),
        notes: create.notes.clone(),
        status: create.status,
        schedule_bucket: create.schedule_bucket,
        priority: create.priority,
        scheduled_date: create.scheduled_date,
        doc_id,
        created_at: now,
        updated_at: now,
    }
}

fn build_document(create: &DocCreate, id: EntityId, now: Timestamp) -> Document {
    Document {
        id,
        title: create.title.clone(),
        content_md: create.content_md.clone(),
        workspace: create.workspace.clone(),
        created_at: now,
        updated_at: now,
    }
}

fn build_event(create: &EventCreate, id: EntityId, now: Timestamp) -> Event {
    Event {
        id,
        title: create.title.clone(),
        starts_at: create.starts_at,
        ends_at: create.ends_at,
        location: create.location.clone(),
        notes: create.notes.clone(),
        created_at: now,
    }
}

fn build_attachment(create: &AttachmentCreate, id: EntityId, now: Timestamp) -> Attachment {
    Attachment {
        id,
        task_id: create.task_id,
        doc_id: create.doc_id,
        filename: create.filename.clone(),
        mime_type: create.mime_type.clone(),
        size_bytes: create.size_bytes,
        storage_key: create.storage_key.clone(),
        created_at: now,
    }
}

/// Storage update for a task patch, with the document link already resolved.
///
/// `doc` is `Some` only when `doc_ref` resolved to a bound alias.
fn task_update(patch: &TaskPatch, doc: Option<Option<EntityId>>) -> TaskUpdate {
    TaskUpdate {
        title: patch.title.clone(),
        workspace: patch.workspace.clone(),
        notes: patch.notes.clone(),
        status: patch.status,
        schedule_bucket: patch.schedule_bucket,
        priority: patch.priority,
        scheduled_date: patch.scheduled_date,
        doc_id: doc.or(patch.doc_id),
    }
}

fn document_update(patch: &DocPatch) -> DocumentUpdate {
    DocumentUpdate {
        title: patch.title.clone(),
        content_md: patch.content_md.clone(),
        workspace: patch.workspace.clone(),
    }
}

fn to_record<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::serialization("record", e))
}

/// Overwrite an id-valued field of a rendered record.
fn set_field(record: &mut Value, field: &str, target: &RefTarget) {
    if let Value::Object(map) = record {
        map.insert(field.to_string(), Value::String(target.to_string()));
    }
}

fn mismatch(index: usize, field: &str, err: ReferenceMismatch) -> ApiError {
    ApiError::validation_failed(FieldError::at(index, field, err.to_string()))
}

fn resolve_target(
    index: usize,
    refs: &ReferenceMap,
    target: &UpdateTarget,
    expected: EntityType,
) -> ApiResult<RefTarget> {
    refs.resolve(target.id_ref.as_deref(), expected, target.id.map(RefTarget::Stored))
        .map_err(|e| mismatch(index, "data.id_ref", e))?
        .ok_or_else(|| {
            ApiError::validation_failed(FieldError::at(
                index,
                "data.id_ref",
                format!(
                    "alias '{}' is not bound by an earlier action and no id was given",
                    target.id_ref.as_deref().unwrap_or_default()
                ),
            ))
        })
}

/// Document a `doc_ref`/`doc_id` pair points at, if any.
fn resolve_doc(
    index: usize,
    refs: &ReferenceMap,
    doc_ref: Option<&str>,
    doc_id: Option<EntityId>,
) -> ApiResult<Option<RefTarget>> {
    refs.resolve(doc_ref, EntityType::Document, doc_id.map(RefTarget::Stored))
        .map_err(|e| mismatch(index, "data.doc_ref", e))
}

/// The doc link requested by a task patch: `Some` when `doc_ref` is bound.
fn resolve_patch_doc(index: usize, refs: &ReferenceMap, patch: &TaskPatch) -> ApiResult<Option<RefTarget>> {
    match patch.doc_ref.as_deref() {
        Some(alias) => refs
            .lookup_as(alias, EntityType::Document)
            .map_err(|e| mismatch(index, "data.doc_ref", e)),
        None => Ok(None),
    }
}

fn stored_or_invalid(index: usize, field: &str, target: RefTarget) -> ApiResult<EntityId> {
    target.stored().ok_or_else(|| {
        ApiError::validation_failed(FieldError::at(
            index,
            field,
            "preview identifiers cannot be written",
        ))
    })
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Runs validated, authorized batches against an [`ActionStore`].
#[derive(Clone)]
pub struct BatchExecutor {
    store: Arc<dyn ActionStore>,
}

impl BatchExecutor {
    pub fn new(store: Arc<dyn ActionStore>) -> Self {
        Self { store }
    }

    /// Apply every action in one transaction and commit.
    ///
    /// `render` turns the results into the response body; the body is stored
    /// in the idempotency ledger (when `ledger` is given) before commit, so a
    /// replay returns exactly the bytes of the first response.
    pub async fn execute<F>(
        &self,
        auth: &AuthContext,
        actions: &[ActionRequest],
        ledger: Option<PendingLedgerEntry>,
        render: F,
    ) -> Result<(Vec<ActionResult>, String), ExecutionError>
    where
        F: FnOnce(&[ActionResult]) -> ApiResult<String> + Send,
    {
        let keyed = ledger.is_some();
        let mut tx = self.store.begin().await?;

        match Self::apply_all(&mut tx, auth, actions, ledger, render).await {
            Ok(outcome) => match tx.commit().await {
                Ok(()) => {
                    tracing::debug!(agent_id = %auth.agent_id, actions = actions.len(), "Batch committed");
                    Ok(outcome)
                }
                // A concurrent batch may have committed the same key.
                Err(StorageError::SerializationConflict { reason }) if keyed => {
                    tracing::warn!(agent_id = %auth.agent_id, %reason, "Commit lost a serialization conflict");
                    Err(ExecutionError::LedgerConflict)
                }
                Err(e) => Err(e.into()),
            },
            Err(err) => {
                tracing::warn!(agent_id = %auth.agent_id, error = %err, "Batch rolled back");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply_all<F>(
        tx: &mut Box<dyn StoreTransaction>,
        auth: &AuthContext,
        actions: &[ActionRequest],
        ledger: Option<PendingLedgerEntry>,
        render: F,
    ) -> Result<(Vec<ActionResult>, String), ExecutionError>
    where
        F: FnOnce(&[ActionResult]) -> ApiResult<String> + Send,
    {
        let mut refs = ReferenceMap::new();
        let mut results = Vec::with_capacity(actions.len());

        for (index, request) in actions.iter().enumerate() {
            let kind = request.kind();
            let mut result = Self::apply_one(tx, index, &refs, &request.action)
                .await
                .map_err(|source| ExecutionError::Action { index, kind, source })?;

            if let Some(alias) = &request.save_as {
                refs.bind(alias, kind.entity_type(), result.id.clone());
                result.save_as = Some(alias.clone());
            }

            let entry = audit::action_entry(auth.agent_id, request, &result)?;
            tx.audit_append(&entry)
                .await
                .map_err(|e| ExecutionError::Action {
                    index,
                    kind,
                    source: e.into(),
                })?;

            results.push(result);
        }

        let body = render(&results)?;

        if let Some(pending) = ledger {
            match tx.idempotency_insert(&pending.into_record(body.clone())).await {
                Ok(()) => {}
                Err(StorageError::DuplicateKey { .. } | StorageError::SerializationConflict { .. }) => {
                    return Err(ExecutionError::LedgerConflict)
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok((results, body))
    }

    async fn apply_one(
        tx: &mut Box<dyn StoreTransaction>,
        index: usize,
        refs: &ReferenceMap,
        action: &Action,
    ) -> ApiResult<ActionResult> {
        let kind = action.kind();
        let now = Utc::now();

        match action {
            Action::TaskCreate(create) => {
                let doc_id = resolve_doc(index, refs, create.doc_ref.as_deref(), create.doc_id)?
                    .map(|t| stored_or_invalid(index, "data.doc_ref", t))
                    .transpose()?;
                let task = build_task(create, new_entity_id(), doc_id, now);
                tx.task_insert(&task).await?;
                Ok(ActionResult::created(kind, task.id.into(), to_record(&task)?))
            }
            Action::TaskUpdate(patch) => {
                let target = resolve_target(index, refs, &patch.target, EntityType::Task)?;
                let id = stored_or_invalid(index, "data.id_ref", target)?;
                let doc = resolve_patch_doc(index, refs, patch)?
                    .map(|t| stored_or_invalid(index, "data.doc_ref", t))
                    .transpose()?
                    .map(Some);
                let update = task_update(patch, doc);

                let task = if update.is_empty() {
                    tx.task_get(id)
                        .await?
                        .ok_or_else(|| ApiError::entity_not_found(EntityType::Task.as_str(), id))?
                } else {
                    tx.task_update(id, &update).await?
                };
                Ok(ActionResult::updated(kind, id.into(), update.changed_fields(), to_record(&task)?))
            }
            Action::DocCreate(create) => {
                let doc = build_document(create, new_entity_id(), now);
                tx.document_insert(&doc).await?;
                Ok(ActionResult::created(kind, doc.id.into(), to_record(&doc)?))
            }
            Action::DocUpdate(patch) => {
                let target = resolve_target(index, refs, &patch.target, EntityType::Document)?;
                let id = stored_or_invalid(index, "data.id_ref", target)?;
                let update = document_update(patch);

                let doc = if update.is_empty() {
                    tx.document_get(id).await?.ok_or_else(|| {
                        ApiError::entity_not_found(EntityType::Document.as_str(), id)
                    })?
                } else {
                    tx.document_update(id, &update).await?
                };
                Ok(ActionResult::updated(kind, id.into(), update.changed_fields(), to_record(&doc)?))
            }
            Action::EventCreate(create) => {
                let event = build_event(create, new_entity_id(), now);
                tx.event_insert(&event).await?;
                Ok(ActionResult::created(kind, event.id.into(), to_record(&event)?))
            }
            Action::AttachmentCreate(create) => {
                let attachment = build_attachment(create, new_entity_id(), now);
                tx.attachment_insert(&attachment).await?;
                Ok(ActionResult::created(
                    kind,
                    attachment.id.into(),
                    to_record(&attachment)?,
                ))
            }
        }
    }

    // ========================================================================
    // DRY RUN
    // ========================================================================

    /// Compute what `actions` would do without writing anything.
    ///
    /// Created entities get preview ids; aliases bind to them so later
    /// actions resolve the same way they would in a real run.
    pub async fn preview(&self, actions: &[ActionRequest]) -> Result<Vec<ActionResult>, ExecutionError> {
        let mut refs = ReferenceMap::new();
        let mut results = Vec::with_capacity(actions.len());

        for (index, request) in actions.iter().enumerate() {
            let kind = request.kind();
            let mut result = self
                .preview_one(index, &refs, &request.action)
                .await
                .map_err(|source| ExecutionError::Action { index, kind, source })?;

            if let Some(alias) = &request.save_as {
                refs.bind(alias, kind.entity_type(), result.id.clone());
                result.save_as = Some(alias.clone());
            }
            result.would_write = Some(false);
            results.push(result);
        }

        Ok(results)
    }

    async fn preview_one(
        &self,
        index: usize,
        refs: &ReferenceMap,
        action: &Action,
    ) -> ApiResult<ActionResult> {
        let kind = action.kind();
        let now = Utc::now();
        let preview = || RefTarget::Preview(PreviewId::generate());

        let created = |record: Value| -> ActionResult {
            let id = preview();
            let mut record = record;
            set_field(&mut record, "id", &id);
            ActionResult::created(kind, id, record)
        };

        match action {
            Action::TaskCreate(create) => {
                let doc = resolve_doc(index, refs, create.doc_ref.as_deref(), create.doc_id)?;
                let task = build_task(create, EntityId::nil(), doc.as_ref().and_then(RefTarget::stored), now);
                let mut result = created(to_record(&task)?);
                if let Some(doc) = &doc {
                    set_field(&mut result.record, "doc_id", doc);
                }
                Ok(result)
            }
            Action::TaskUpdate(patch) => {
                let target = resolve_target(index, refs, &patch.target, EntityType::Task)?;
                let doc = resolve_patch_doc(index, refs, patch)?;
                let update = task_update(patch, doc.as_ref().map(RefTarget::stored));
                let changed = update.changed_fields();

                let mut record = match target.stored() {
                    Some(id) => {
                        let mut task = self
                            .store
                            .task_get(id)
                            .await?
                            .ok_or_else(|| ApiError::entity_not_found(EntityType::Task.as_str(), id))?;
                        if !update.is_empty() {
                            update.apply_to(&mut task, now);
                        }
                        to_record(&task)?
                    }
                    None => patch_record(patch, &target)?,
                };
                if let Some(doc) = &doc {
                    set_field(&mut record, "doc_id", doc);
                }
                Ok(ActionResult::updated(kind, target, changed, record))
            }
            Action::DocCreate(create) => {
                Ok(created(to_record(&build_document(create, EntityId::nil(), now))?))
            }
            Action::DocUpdate(patch) => {
                let target = resolve_target(index, refs, &patch.target, EntityType::Document)?;
                let update = document_update(patch);
                let changed = update.changed_fields();

                let record = match target.stored() {
                    Some(id) => {
                        let mut doc = self.store.document_get(id).await?.ok_or_else(|| {
                            ApiError::entity_not_found(EntityType::Document.as_str(), id)
                        })?;
                        if !update.is_empty() {
                            update.apply_to(&mut doc, now);
                        }
                        to_record(&doc)?
                    }
                    None => patch_record(patch, &target)?,
                };
                Ok(ActionResult::updated(kind, target, changed, record))
            }
            Action::EventCreate(create) => {
                Ok(created(to_record(&build_event(create, EntityId::nil(), now))?))
            }
            Action::AttachmentCreate(create) => {
                Ok(created(to_record(&build_attachment(create, EntityId::nil(), now))?))
            }
        }
    }
}

/// Preview record for an update whose target only exists in this dry run:
/// the target id plus the fields the patch sets.
fn patch_record<T: Serialize>(patch: &T, target: &RefTarget) -> ApiResult<Value> {
    let mut record = to_record(patch)?;
    if let Value::Object(map) = &mut record {
        map.remove("id_ref");
        map.remove("doc_ref");
    }
    set_field(&mut record, "id", target);
    Ok(record)
}
