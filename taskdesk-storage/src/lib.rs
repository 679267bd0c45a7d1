//! taskdesk Storage - Storage Traits and In-Memory Implementation
//!
//! Defines the storage abstraction the agent action pipeline writes through.
//! The PostgreSQL implementation lives in taskdesk-api.

pub mod async_trait;
pub mod memory;

pub use async_trait::{ActionStore, AgentDirectory, StorageStatistics, StoreTransaction};
pub use memory::{InMemoryAgentDirectory, InMemoryStore, MemoryState};

use chrono::NaiveDate;
use taskdesk_core::{Document, EntityId, ScheduleBucket, Task, TaskStatus, Timestamp};

// ============================================================================
// UPDATE TYPES
// ============================================================================

/// Partial update payload for tasks.
///
/// `None` leaves a column untouched. For nullable columns the inner option
/// distinguishes "set to null" (`Some(None)`) from "leave alone" (`None`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub workspace: Option<String>,
    pub notes: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub schedule_bucket: Option<ScheduleBucket>,
    pub priority: Option<i32>,
    pub scheduled_date: Option<Option<NaiveDate>>,
    pub doc_id: Option<Option<EntityId>>,
}

impl TaskUpdate {
    /// Names of the columns this update touches, in schema order.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.workspace.is_some() {
            fields.push("workspace");
        }
        if self.notes.is_some() {
            fields.push("notes");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        if self.schedule_bucket.is_some() {
            fields.push("schedule_bucket");
        }
        if self.priority.is_some() {
            fields.push("priority");
        }
        if self.scheduled_date.is_some() {
            fields.push("scheduled_date");
        }
        if self.doc_id.is_some() {
            fields.push("doc_id");
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Apply to an in-memory row.
    pub fn apply_to(&self, task: &mut Task, now: Timestamp) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(workspace) = &self.workspace {
            task.workspace = workspace.clone();
        }
        if let Some(notes) = &self.notes {
            task.notes = notes.clone();
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(bucket) = self.schedule_bucket {
            task.schedule_bucket = bucket;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(date) = self.scheduled_date {
            task.scheduled_date = date;
        }
        if let Some(doc_id) = self.doc_id {
            task.doc_id = doc_id;
        }
        task.updated_at = now;
    }
}

/// Partial update payload for documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub title: Option<String>,
    pub content_md: Option<String>,
    pub workspace: Option<String>,
}

impl DocumentUpdate {
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.content_md.is_some() {
            fields.push("content_md");
        }
        if self.workspace.is_some() {
            fields.push("workspace");
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    pub fn apply_to(&self, doc: &mut Document, now: Timestamp) {
        if let Some(title) = &self.title {
            doc.title = title.clone();
        }
        if let Some(content) = &self.content_md {
            doc.content_md = content.clone();
        }
        if let Some(workspace) = &self.workspace {
            doc.workspace = workspace.clone();
        }
        doc.updated_at = now;
    }
}
