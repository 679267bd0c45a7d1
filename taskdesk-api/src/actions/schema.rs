//! Wire schema for agent batch actions.
//!
//! A request body is parsed in two stages. Each field of an action's `data`
//! object is taken and type-checked on its own into a permissive wire struct;
//! whatever no field claimed is reported as unknown. The wire struct is then
//! normalized into a strongly typed payload with defaults applied. Every
//! violation found along the way is collected, so one 400 response lists all
//! of them.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use taskdesk_core::{
    ActionKind, EntityId, PreviewId, ScheduleBucket, TaskStatus, DEFAULT_PRIORITY, MAX_PRIORITY,
    MIN_PRIORITY,
};
use uuid::Uuid;

use crate::constants::{DEFAULT_MIME_TYPE, DEFAULT_WORKSPACE, MAX_ALIAS_LEN, MAX_TITLE_LEN};
use crate::error::{ApiError, ApiResult, FieldError};

static ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").expect("valid alias regex"));

/// Whether `alias` is usable as a `saveAs` name or `*_ref` value.
pub fn is_valid_alias(alias: &str) -> bool {
    alias.len() <= MAX_ALIAS_LEN && ALIAS_RE.is_match(alias)
}

// ============================================================================
// NORMALIZED PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskCreate {
    pub title: String,
    pub workspace: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub schedule_bucket: ScheduleBucket,
    pub priority: i32,
    pub scheduled_date: Option<NaiveDate>,
    pub doc_ref: Option<String>,
    pub doc_id: Option<EntityId>,
}

/// Row an update action targets: a batch alias, a literal id, or both.
/// The alias wins when it is bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
}

/// Partial task update. `None` means "not present in the payload"; for
/// nullable columns `Some(None)` clears the column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(flatten)]
    pub target: UpdateTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_bucket: Option<ScheduleBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<Option<EntityId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocCreate {
    pub title: String,
    pub content_md: String,
    pub workspace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocPatch {
    #[serde(flatten)]
    pub target: UpdateTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventCreate {
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentCreate {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_key: Option<String>,
    pub task_id: Option<EntityId>,
    pub doc_id: Option<EntityId>,
}

/// One validated action, one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Action {
    TaskCreate(TaskCreate),
    TaskUpdate(TaskPatch),
    DocCreate(DocCreate),
    DocUpdate(DocPatch),
    EventCreate(EventCreate),
    AttachmentCreate(AttachmentCreate),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::TaskCreate(_) => ActionKind::TaskCreate,
            Action::TaskUpdate(_) => ActionKind::TaskUpdate,
            Action::DocCreate(_) => ActionKind::DocCreate,
            Action::DocUpdate(_) => ActionKind::DocUpdate,
            Action::EventCreate(_) => ActionKind::EventCreate,
            Action::AttachmentCreate(_) => ActionKind::AttachmentCreate,
        }
    }
}

/// A validated action together with its alias and the item as submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: Action,
    pub save_as: Option<String>,
    /// The action item exactly as received, kept for the audit log.
    pub raw: Value,
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    /// Canonical JSON form of the normalized action.
    pub fn normalized(&self) -> ApiResult<Value> {
        let mut item = Map::new();
        item.insert("type".to_string(), Value::from(self.kind().as_str()));
        item.insert(
            "data".to_string(),
            serde_json::to_value(&self.action)
                .map_err(|e| ApiError::serialization("normalized action", e))?,
        );
        if let Some(alias) = &self.save_as {
            item.insert("saveAs".to_string(), Value::from(alias.as_str()));
        }
        Ok(Value::Object(item))
    }
}

/// A validated batch request.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub actions: Vec<ActionRequest>,
    pub dry_run: bool,
}

// ============================================================================
// WIRE PAYLOADS
// ============================================================================

/// Fields of one `data` object, read one at a time and checked individually.
///
/// Whatever is left after a kind has taken its fields is unknown.
type DataFields = Map<String, Value>;

#[derive(Debug)]
struct WireTaskCreate {
    title: Option<String>,
    workspace: Option<String>,
    notes: Option<String>,
    status: Option<String>,
    schedule_bucket: Option<String>,
    priority: Option<i64>,
    scheduled_date: Option<String>,
    doc_ref: Option<String>,
    doc_id: Option<String>,
}

impl WireTaskCreate {
    fn take(c: &mut Checker<'_>, data: &mut DataFields) -> Self {
        Self {
            title: c.take_text(data, "title"),
            workspace: c.take_text(data, "workspace"),
            notes: c.take_text(data, "notes"),
            status: c.take_text(data, "status"),
            schedule_bucket: c.take_text(data, "schedule_bucket"),
            priority: c.take_integer(data, "priority"),
            scheduled_date: c.take_text(data, "scheduled_date"),
            doc_ref: c.take_text(data, "doc_ref"),
            doc_id: c.take_text(data, "doc_id"),
        }
    }
}

#[derive(Debug)]
struct WireTaskUpdate {
    id: Option<String>,
    id_ref: Option<String>,
    title: Option<String>,
    workspace: Option<String>,
    notes: Option<Option<String>>,
    status: Option<String>,
    schedule_bucket: Option<String>,
    priority: Option<i64>,
    scheduled_date: Option<Option<String>>,
    doc_ref: Option<String>,
    doc_id: Option<Option<String>>,
}

impl WireTaskUpdate {
    fn take(c: &mut Checker<'_>, data: &mut DataFields) -> Self {
        Self {
            id: c.take_text(data, "id"),
            id_ref: c.take_text(data, "id_ref"),
            title: c.take_text(data, "title"),
            workspace: c.take_text(data, "workspace"),
            notes: c.take_nullable_text(data, "notes"),
            status: c.take_text(data, "status"),
            schedule_bucket: c.take_text(data, "schedule_bucket"),
            priority: c.take_integer(data, "priority"),
            scheduled_date: c.take_nullable_text(data, "scheduled_date"),
            doc_ref: c.take_text(data, "doc_ref"),
            doc_id: c.take_nullable_text(data, "doc_id"),
        }
    }
}

#[derive(Debug)]
struct WireDocCreate {
    title: Option<String>,
    content_md: Option<String>,
    workspace: Option<String>,
}

impl WireDocCreate {
    fn take(c: &mut Checker<'_>, data: &mut DataFields) -> Self {
        Self {
            title: c.take_text(data, "title"),
            content_md: c.take_text(data, "content_md"),
            workspace: c.take_text(data, "workspace"),
        }
    }
}

#[derive(Debug)]
struct WireDocUpdate {
    id: Option<String>,
    id_ref: Option<String>,
    title: Option<String>,
    content_md: Option<String>,
    workspace: Option<String>,
}

impl WireDocUpdate {
    fn take(c: &mut Checker<'_>, data: &mut DataFields) -> Self {
        Self {
            id: c.take_text(data, "id"),
            id_ref: c.take_text(data, "id_ref"),
            title: c.take_text(data, "title"),
            content_md: c.take_text(data, "content_md"),
            workspace: c.take_text(data, "workspace"),
        }
    }
}

#[derive(Debug)]
struct WireEventCreate {
    title: Option<String>,
    starts_at: Option<String>,
    ends_at: Option<String>,
    location: Option<String>,
    notes: Option<String>,
}

impl WireEventCreate {
    fn take(c: &mut Checker<'_>, data: &mut DataFields) -> Self {
        Self {
            title: c.take_text(data, "title"),
            starts_at: c.take_text(data, "starts_at"),
            ends_at: c.take_text(data, "ends_at"),
            location: c.take_text(data, "location"),
            notes: c.take_text(data, "notes"),
        }
    }
}

#[derive(Debug)]
struct WireAttachmentCreate {
    filename: Option<String>,
    mime_type: Option<String>,
    size_bytes: Option<i64>,
    storage_key: Option<String>,
    task_id: Option<String>,
    doc_id: Option<String>,
}

impl WireAttachmentCreate {
    fn take(c: &mut Checker<'_>, data: &mut DataFields) -> Self {
        Self {
            filename: c.take_text(data, "filename"),
            mime_type: c.take_text(data, "mime_type"),
            size_bytes: c.take_integer(data, "size_bytes"),
            storage_key: c.take_text(data, "storage_key"),
            task_id: c.take_text(data, "task_id"),
            doc_id: c.take_text(data, "doc_id"),
        }
    }
}

// ============================================================================
// FIELD CHECKS
// ============================================================================

/// Collects violations for the action at one index.
struct Checker<'a> {
    index: usize,
    errors: &'a mut Vec<FieldError>,
    failed: bool,
}

impl<'a> Checker<'a> {
    fn new(index: usize, errors: &'a mut Vec<FieldError>) -> Self {
        Self {
            index,
            errors,
            failed: false,
        }
    }

    /// Record a violation. Only the first one per field is kept.
    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.failed = true;
        let seen = self
            .errors
            .iter()
            .any(|e| e.index == Some(self.index) && e.field == field);
        if !seen {
            self.errors.push(FieldError::at(self.index, field, message));
        }
    }

    fn data_field(field: &str) -> String {
        format!("data.{}", field)
    }

    /// A string field. `null` counts as absent.
    fn take_text(&mut self, data: &mut DataFields, field: &str) -> Option<String> {
        match data.remove(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(_) => {
                self.fail(&Self::data_field(field), "must be a string");
                None
            }
        }
    }

    /// A clearable string field: absent is `None`, `null` is `Some(None)`.
    fn take_nullable_text(&mut self, data: &mut DataFields, field: &str) -> Option<Option<String>> {
        match data.remove(field) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(Value::String(text)) => Some(Some(text)),
            Some(_) => {
                self.fail(&Self::data_field(field), "must be a string or null");
                None
            }
        }
    }

    fn take_integer(&mut self, data: &mut DataFields, field: &str) -> Option<i64> {
        match data.remove(field) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) if n.is_i64() => n.as_i64(),
            Some(_) => {
                self.fail(&Self::data_field(field), "must be an integer");
                None
            }
        }
    }

    fn reject_unknown(&mut self, data: &DataFields) {
        for field in data.keys() {
            self.fail(&Self::data_field(field), "unknown field");
        }
    }

    fn required_text(&mut self, field: &str, value: Option<String>, max_len: usize) -> String {
        match value.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                if text.chars().count() > max_len {
                    self.fail(
                        &Self::data_field(field),
                        format!("must be at most {} characters", max_len),
                    );
                }
                text.to_string()
            }
            _ => {
                self.fail(&Self::data_field(field), "is required");
                String::new()
            }
        }
    }

    /// A present field that must not be blank after trimming.
    fn present_text(&mut self, field: &str, value: Option<String>, max_len: usize) -> Option<String> {
        value.map(|text| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                self.fail(&Self::data_field(field), "must not be empty");
            } else if trimmed.chars().count() > max_len {
                self.fail(
                    &Self::data_field(field),
                    format!("must be at most {} characters", max_len),
                );
            }
            trimmed.to_string()
        })
    }

    fn parse_enum<T: FromStr<Err = String>>(&mut self, field: &str, value: Option<String>) -> Option<T> {
        let raw = value?;
        match raw.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(msg) => {
                self.fail(&Self::data_field(field), msg);
                None
            }
        }
    }

    fn priority(&mut self, value: Option<i64>) -> Option<i32> {
        let raw = value?;
        if raw < i64::from(MIN_PRIORITY) || raw > i64::from(MAX_PRIORITY) {
            self.fail(
                "data.priority",
                format!("must be between {} and {}", MIN_PRIORITY, MAX_PRIORITY),
            );
            return None;
        }
        i32::try_from(raw).ok()
    }

    fn date(&mut self, field: &str, value: Option<String>) -> Option<NaiveDate> {
        let raw = optional_text(value)?;
        match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.fail(&Self::data_field(field), "must be a date in YYYY-MM-DD format");
                None
            }
        }
    }

    fn timestamp(&mut self, field: &str, value: Option<String>) -> Option<DateTime<Utc>> {
        let raw = optional_text(value)?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(_) => {
                self.fail(&Self::data_field(field), "must be an RFC 3339 timestamp");
                None
            }
        }
    }

    /// A literal entity id. Preview identifiers are rejected outright.
    fn entity_id(&mut self, field: &str, value: Option<String>) -> Option<EntityId> {
        let raw = optional_text(value)?;
        if PreviewId::is_preview(&raw) {
            self.fail(
                &Self::data_field(field),
                "preview identifiers from a dry run cannot be used as references",
            );
            return None;
        }
        match Uuid::parse_str(&raw) {
            Ok(id) => Some(id),
            Err(_) => {
                self.fail(&Self::data_field(field), "must be a UUID");
                None
            }
        }
    }

    fn alias(&mut self, field: &str, value: Option<String>) -> Option<String> {
        let raw = value?;
        if !is_valid_alias(&raw) {
            self.fail(
                &Self::data_field(field),
                format!("must match [A-Za-z0-9_.-]{{1,{}}}", MAX_ALIAS_LEN),
            );
        }
        Some(raw)
    }

    fn target(&mut self, id: Option<String>, id_ref: Option<String>) -> UpdateTarget {
        let id = optional_text(id);
        if id.is_none() && id_ref.is_none() {
            self.fail("data.id", "either id or id_ref is required");
        }
        UpdateTarget {
            id_ref: self.alias("id_ref", id_ref),
            id: self.entity_id("id", id),
        }
    }
}

/// Trimmed text, with blank strings normalized to `None`.
fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`optional_text`] for nullable update fields, where blank means "clear".
fn nullable_text(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(optional_text)
}

// ============================================================================
// NORMALIZATION
// ============================================================================

fn normalize_task_create(c: &mut Checker<'_>, wire: WireTaskCreate) -> TaskCreate {
    let title = c.required_text("title", wire.title, MAX_TITLE_LEN);
    let status: TaskStatus = c.parse_enum("status", wire.status).unwrap_or_default();
    let schedule_bucket = c
        .parse_enum("schedule_bucket", wire.schedule_bucket)
        .unwrap_or_else(|| ScheduleBucket::default_for(status));

    TaskCreate {
        title,
        workspace: optional_text(wire.workspace).unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
        notes: optional_text(wire.notes),
        status,
        schedule_bucket,
        priority: c.priority(wire.priority).unwrap_or(DEFAULT_PRIORITY),
        scheduled_date: c.date("scheduled_date", wire.scheduled_date),
        doc_ref: c.alias("doc_ref", wire.doc_ref),
        doc_id: c.entity_id("doc_id", wire.doc_id),
    }
}

fn normalize_task_update(c: &mut Checker<'_>, wire: WireTaskUpdate) -> TaskPatch {
    let target = c.target(wire.id, wire.id_ref);

    let scheduled_date = wire.scheduled_date.map(|date| match optional_text(date) {
        Some(raw) => c.date("scheduled_date", Some(raw)),
        None => None,
    });
    let doc_id = wire.doc_id.map(|id| match optional_text(id) {
        Some(raw) => c.entity_id("doc_id", Some(raw)),
        None => None,
    });

    TaskPatch {
        target,
        title: c.present_text("title", wire.title, MAX_TITLE_LEN),
        workspace: c.present_text("workspace", wire.workspace, MAX_TITLE_LEN),
        notes: nullable_text(wire.notes),
        status: c.parse_enum("status", wire.status),
        schedule_bucket: c.parse_enum("schedule_bucket", wire.schedule_bucket),
        priority: c.priority(wire.priority),
        scheduled_date,
        doc_ref: c.alias("doc_ref", wire.doc_ref),
        doc_id,
    }
}

fn normalize_doc_create(c: &mut Checker<'_>, wire: WireDocCreate) -> DocCreate {
    DocCreate {
        title: c.required_text("title", wire.title, MAX_TITLE_LEN),
        content_md: wire.content_md.unwrap_or_default(),
        workspace: optional_text(wire.workspace).unwrap_or_else(|| DEFAULT_WORKSPACE.to_string()),
    }
}

fn normalize_doc_update(c: &mut Checker<'_>, wire: WireDocUpdate) -> DocPatch {
    DocPatch {
        target: c.target(wire.id, wire.id_ref),
        title: c.present_text("title", wire.title, MAX_TITLE_LEN),
        content_md: wire.content_md,
        workspace: c.present_text("workspace", wire.workspace, MAX_TITLE_LEN),
    }
}

fn normalize_event_create(c: &mut Checker<'_>, wire: WireEventCreate) -> EventCreate {
    let title = c.required_text("title", wire.title, MAX_TITLE_LEN);
    let starts_at = match optional_text(wire.starts_at) {
        Some(raw) => c.timestamp("starts_at", Some(raw)),
        None => {
            c.fail("data.starts_at", "is required");
            None
        }
    };
    let ends_at = c.timestamp("ends_at", wire.ends_at);

    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end < start {
            c.fail("data.ends_at", "must not be earlier than starts_at");
        }
    }

    EventCreate {
        title,
        starts_at: starts_at.unwrap_or_default(),
        ends_at,
        location: optional_text(wire.location),
        notes: optional_text(wire.notes),
    }
}

fn normalize_attachment_create(c: &mut Checker<'_>, wire: WireAttachmentCreate) -> AttachmentCreate {
    let filename = c.required_text("filename", wire.filename, MAX_TITLE_LEN);
    let size_bytes = wire.size_bytes.unwrap_or(0);
    if size_bytes < 0 {
        c.fail("data.size_bytes", "must not be negative");
    }

    AttachmentCreate {
        filename,
        mime_type: optional_text(wire.mime_type).unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        size_bytes,
        storage_key: optional_text(wire.storage_key),
        task_id: c.entity_id("task_id", wire.task_id),
        doc_id: c.entity_id("doc_id", wire.doc_id),
    }
}

fn normalize_data(c: &mut Checker<'_>, kind: ActionKind, mut data: DataFields) -> Action {
    let action = match kind {
        ActionKind::TaskCreate => {
            let wire = WireTaskCreate::take(c, &mut data);
            Action::TaskCreate(normalize_task_create(c, wire))
        }
        ActionKind::TaskUpdate => {
            let wire = WireTaskUpdate::take(c, &mut data);
            Action::TaskUpdate(normalize_task_update(c, wire))
        }
        ActionKind::DocCreate => {
            let wire = WireDocCreate::take(c, &mut data);
            Action::DocCreate(normalize_doc_create(c, wire))
        }
        ActionKind::DocUpdate => {
            let wire = WireDocUpdate::take(c, &mut data);
            Action::DocUpdate(normalize_doc_update(c, wire))
        }
        ActionKind::EventCreate => {
            let wire = WireEventCreate::take(c, &mut data);
            Action::EventCreate(normalize_event_create(c, wire))
        }
        ActionKind::AttachmentCreate => {
            let wire = WireAttachmentCreate::take(c, &mut data);
            Action::AttachmentCreate(normalize_attachment_create(c, wire))
        }
    };
    c.reject_unknown(&data);
    action
}

// ============================================================================
// ENVELOPE
// ============================================================================

fn parse_action(index: usize, item: Value, errors: &mut Vec<FieldError>) -> Option<ActionRequest> {
    let raw = item.clone();
    let mut c = Checker::new(index, errors);

    let Value::Object(mut fields) = item else {
        c.fail("action", "must be an object");
        return None;
    };

    let kind = match fields.remove("type") {
        Some(Value::String(tag)) => match tag.parse::<ActionKind>() {
            Ok(kind) => Some(kind),
            Err(msg) => {
                c.fail("type", msg);
                None
            }
        },
        Some(_) => {
            c.fail("type", "must be a string");
            None
        }
        None => {
            c.fail("type", "is required");
            None
        }
    };

    let save_as = match fields.remove("saveAs") {
        None | Some(Value::Null) => None,
        Some(Value::String(alias)) => {
            if !is_valid_alias(&alias) {
                c.fail("saveAs", format!("must match [A-Za-z0-9_.-]{{1,{}}}", MAX_ALIAS_LEN));
            }
            Some(alias)
        }
        Some(_) => {
            c.fail("saveAs", "must be a string");
            None
        }
    };

    let data = match fields.remove("data") {
        None | Some(Value::Null) => Some(Map::new()),
        Some(Value::Object(data)) => Some(data),
        Some(_) => {
            c.fail("data", "must be an object");
            None
        }
    };

    for unknown in fields.keys() {
        c.fail(unknown, "unknown field");
    }

    let kind = kind?;
    if save_as.is_some() && !kind.creates_entity() {
        c.fail("saveAs", format!("saveAs is not allowed on {}", kind));
    }
    let action = normalize_data(&mut c, kind, data?);
    if c.failed {
        return None;
    }

    Some(ActionRequest {
        action,
        save_as,
        raw,
    })
}

/// Validate a parsed request body.
pub fn validate_batch(body: Value, max_actions: usize) -> ApiResult<Batch> {
    let Value::Object(mut envelope) = body else {
        return Err(ApiError::validation_failed(FieldError::new(
            None,
            "body",
            "must be a JSON object",
        )));
    };

    let mut errors = Vec::new();

    let dry_run = match envelope.remove("dry_run") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(_) => {
            errors.push(FieldError::new(None, "dry_run", "must be a boolean"));
            false
        }
    };

    let items = match envelope.remove("actions") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            errors.push(FieldError::new(None, "actions", "must be an array"));
            return Err(ApiError::validation_errors(errors));
        }
        None => {
            errors.push(FieldError::new(None, "actions", "is required"));
            return Err(ApiError::validation_errors(errors));
        }
    };

    if items.is_empty() {
        errors.push(FieldError::new(None, "actions", "at least one action is required"));
        return Err(ApiError::validation_errors(errors));
    }
    if items.len() > max_actions {
        errors.push(FieldError::new(
            None,
            "actions",
            format!("at most {} actions are allowed, got {}", max_actions, items.len()),
        ));
        return Err(ApiError::validation_errors(errors));
    }

    let mut actions = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if let Some(action) = parse_action(index, item, &mut errors) {
            actions.push(action);
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::validation_errors(errors));
    }

    Ok(Batch { actions, dry_run })
}
