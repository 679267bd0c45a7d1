//! Enum types for taskdesk entities and agent actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity type discriminator used in storage errors and audit payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Document,
    Event,
    Attachment,
    AuditEntry,
    IdempotencyRecord,
    Agent,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Task => "task",
            EntityType::Document => "document",
            EntityType::Event => "event",
            EntityType::Attachment => "attachment",
            EntityType::AuditEntry => "audit_entry",
            EntityType::IdempotencyRecord => "idempotency_record",
            EntityType::Agent => "agent",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Inbox,
    Planned,
    Doing,
    Waiting,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Inbox => "inbox",
            TaskStatus::Planned => "planned",
            TaskStatus::Doing => "doing",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(TaskStatus::Inbox),
            "planned" => Ok(TaskStatus::Planned),
            "doing" => Ok(TaskStatus::Doing),
            "waiting" => Ok(TaskStatus::Waiting),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status '{}'", other)),
        }
    }
}

/// Part of the day a task is scheduled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleBucket {
    #[default]
    None,
    Morning,
    Afternoon,
    Evening,
}

impl ScheduleBucket {
    /// Bucket a new task lands in when the caller did not pick one.
    pub fn default_for(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Planned => ScheduleBucket::Morning,
            _ => ScheduleBucket::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleBucket::None => "none",
            ScheduleBucket::Morning => "morning",
            ScheduleBucket::Afternoon => "afternoon",
            ScheduleBucket::Evening => "evening",
        }
    }
}

impl fmt::Display for ScheduleBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ScheduleBucket::None),
            "morning" => Ok(ScheduleBucket::Morning),
            "afternoon" => Ok(ScheduleBucket::Afternoon),
            "evening" => Ok(ScheduleBucket::Evening),
            other => Err(format!("unknown schedule bucket '{}'", other)),
        }
    }
}

/// Lowest task priority.
pub const MIN_PRIORITY: i32 = 1;

/// Highest task priority.
pub const MAX_PRIORITY: i32 = 4;

/// Priority assigned when a task is created without one.
pub const DEFAULT_PRIORITY: i32 = 2;

/// The closed set of agent action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "task.create")]
    TaskCreate,
    #[serde(rename = "task.update")]
    TaskUpdate,
    #[serde(rename = "doc.create")]
    DocCreate,
    #[serde(rename = "doc.update")]
    DocUpdate,
    #[serde(rename = "event.create")]
    EventCreate,
    #[serde(rename = "attachment.create")]
    AttachmentCreate,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::TaskCreate,
        ActionKind::TaskUpdate,
        ActionKind::DocCreate,
        ActionKind::DocUpdate,
        ActionKind::EventCreate,
        ActionKind::AttachmentCreate,
    ];

    /// Wire tag for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::TaskCreate => "task.create",
            ActionKind::TaskUpdate => "task.update",
            ActionKind::DocCreate => "doc.create",
            ActionKind::DocUpdate => "doc.update",
            ActionKind::EventCreate => "event.create",
            ActionKind::AttachmentCreate => "attachment.create",
        }
    }

    /// Whether this kind mints a new entity (and may therefore declare `saveAs`).
    pub fn creates_entity(&self) -> bool {
        !matches!(self, ActionKind::TaskUpdate | ActionKind::DocUpdate)
    }

    /// Entity type this kind writes.
    pub fn entity_type(&self) -> EntityType {
        match self {
            ActionKind::TaskCreate | ActionKind::TaskUpdate => EntityType::Task,
            ActionKind::DocCreate | ActionKind::DocUpdate => EntityType::Document,
            ActionKind::EventCreate => EntityType::Event,
            ActionKind::AttachmentCreate => EntityType::Attachment,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown action type '{}'", s))
    }
}
