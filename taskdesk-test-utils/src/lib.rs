//! taskdesk Test Utilities
//!
//! Shared test infrastructure for the taskdesk workspace:
//! - Proptest generators for action payloads and batches
//! - Fixtures that build well-formed action JSON and seeded stores
//! - Assertions over store contents

pub use taskdesk_core::{
    ActionKind, AuditEntry, EntityId, ScheduleBucket, StorageError, TaskStatus, Timestamp,
    MAX_PRIORITY, MIN_PRIORITY, REQUEST_ERROR_ACTION,
};
pub use taskdesk_storage::{InMemoryAgentDirectory, InMemoryStore, StorageStatistics};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use super::*;

    /// Non-blank title text.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9 ]{0,40}"
    }

    /// Alias accepted by `saveAs` and `*_ref` fields.
    pub fn arb_alias() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    pub fn arb_workspace() -> impl Strategy<Value = String> {
        prop_oneof![Just("personal".to_string()), Just("work".to_string()), "[a-z]{3,10}"]
    }

    pub fn arb_task_status() -> impl Strategy<Value = TaskStatus> {
        prop_oneof![
            Just(TaskStatus::Inbox),
            Just(TaskStatus::Planned),
            Just(TaskStatus::Doing),
            Just(TaskStatus::Waiting),
            Just(TaskStatus::Done),
        ]
    }

    pub fn arb_schedule_bucket() -> impl Strategy<Value = ScheduleBucket> {
        prop_oneof![
            Just(ScheduleBucket::None),
            Just(ScheduleBucket::Morning),
            Just(ScheduleBucket::Afternoon),
            Just(ScheduleBucket::Evening),
        ]
    }

    pub fn arb_priority() -> impl Strategy<Value = i32> {
        MIN_PRIORITY..=MAX_PRIORITY
    }

    /// A valid `task.create` action, optionally declaring `saveAs`.
    pub fn arb_task_create(save_as: Option<String>) -> impl Strategy<Value = Value> {
        (
            arb_title(),
            arb_workspace(),
            arb_task_status(),
            arb_priority(),
            proptest::option::of("[a-z ]{1,30}"),
        )
            .prop_map(move |(title, workspace, status, priority, notes)| {
                let mut data = json!({
                    "title": title,
                    "workspace": workspace,
                    "status": status.as_str(),
                    "priority": priority,
                });
                if let Some(notes) = notes {
                    data["notes"] = json!(notes);
                }
                fixtures::with_save_as(json!({ "type": "task.create", "data": data }), save_as.as_deref())
            })
    }

    /// A valid `doc.create` action.
    pub fn arb_doc_create(save_as: Option<String>) -> impl Strategy<Value = Value> {
        (arb_title(), "[a-z #\n]{0,80}").prop_map(move |(title, content)| {
            fixtures::with_save_as(
                json!({ "type": "doc.create", "data": { "title": title, "content_md": content } }),
                save_as.as_deref(),
            )
        })
    }

    /// A valid `event.create` action.
    pub fn arb_event_create() -> impl Strategy<Value = Value> {
        (arb_title(), 0i64..1_000_000).prop_map(|(title, offset)| {
            let starts_at = chrono::DateTime::from_timestamp(1_700_000_000 + offset, 0)
                .unwrap_or_default();
            json!({
                "type": "event.create",
                "data": { "title": title, "starts_at": starts_at.to_rfc3339() }
            })
        })
    }

    /// A list of independent, valid create actions of mixed kinds.
    pub fn arb_create_actions(max: usize) -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(
            prop_oneof![
                arb_task_create(None),
                arb_doc_create(None),
                arb_event_create(),
            ],
            1..=max,
        )
    }

    /// A doc that is saved under an alias, followed by tasks that link to it
    /// through `doc_ref`.
    pub fn arb_linked_batch(max_tasks: usize) -> impl Strategy<Value = (String, Vec<Value>)> {
        (arb_alias(), prop::collection::vec(arb_title(), 1..=max_tasks)).prop_flat_map(
            |(alias, titles)| {
                let doc = arb_doc_create(Some(alias.clone()));
                (Just(alias), doc, Just(titles))
            },
        )
        .prop_map(|(alias, doc, titles)| {
            let mut actions = vec![doc];
            actions.extend(titles.into_iter().map(|title| {
                json!({
                    "type": "task.create",
                    "data": { "title": title, "doc_ref": alias }
                })
            }));
            (alias, actions)
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use serde_json::{json, Value};

    use super::*;

    /// Token of the agent holding every capability.
    pub const ADMIN_TOKEN: &str = "test-admin-token";

    /// Token of the agent that may only write tasks.
    pub const TASKS_ONLY_TOKEN: &str = "test-tasks-token";

    /// Directory with an all-capability agent and a tasks-only agent.
    pub async fn seeded_directory() -> InMemoryAgentDirectory {
        let directory = InMemoryAgentDirectory::new();
        directory.register("admin-agent", ADMIN_TOKEN, ["*"]).await;
        directory
            .register("tasks-agent", TASKS_ONLY_TOKEN, ["tasks:write"])
            .await;
        directory
    }

    /// Attach a `saveAs` alias to an action object.
    pub fn with_save_as(mut action: Value, save_as: Option<&str>) -> Value {
        if let Some(alias) = save_as {
            action["saveAs"] = json!(alias);
        }
        action
    }

    pub fn task_create(title: &str) -> Value {
        json!({ "type": "task.create", "data": { "title": title } })
    }

    pub fn task_create_linked(title: &str, doc_ref: &str) -> Value {
        json!({ "type": "task.create", "data": { "title": title, "doc_ref": doc_ref } })
    }

    pub fn doc_create(title: &str, save_as: Option<&str>) -> Value {
        with_save_as(
            json!({ "type": "doc.create", "data": { "title": title, "content_md": "" } }),
            save_as,
        )
    }

    pub fn task_update_by_id(id: EntityId, data: Value) -> Value {
        let mut data = data;
        data["id"] = json!(id.to_string());
        json!({ "type": "task.update", "data": data })
    }

    pub fn task_update_by_ref(id_ref: &str, data: Value) -> Value {
        let mut data = data;
        data["id_ref"] = json!(id_ref);
        json!({ "type": "task.update", "data": data })
    }

    pub fn event_create(title: &str, starts_at: &str) -> Value {
        json!({ "type": "event.create", "data": { "title": title, "starts_at": starts_at } })
    }

    pub fn attachment_create(filename: &str) -> Value {
        json!({ "type": "attachment.create", "data": { "filename": filename } })
    }

    /// Request body for a batch.
    pub fn batch(actions: Vec<Value>, dry_run: bool) -> Value {
        json!({ "actions": actions, "dry_run": dry_run })
    }

    /// The canonical example: a document plus a task linked to it by alias.
    pub fn doc_and_linked_task() -> Value {
        batch(
            vec![
                doc_create("Q3 planning", Some("plan")),
                task_create_linked("Draft Q3 plan", "plan"),
            ],
            false,
        )
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert that no entity, audit or ledger row was written.
    pub async fn assert_store_empty(store: &InMemoryStore) {
        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot.statistics(),
            StorageStatistics::default(),
            "expected an untouched store"
        );
    }

    /// Assert that the audit log holds exactly the given action kinds, in order.
    pub fn assert_audit_kinds(entries: &[AuditEntry], expected: &[&str]) {
        let kinds: Vec<&str> = entries.iter().map(|e| e.action_kind.as_str()).collect();
        assert_eq!(kinds, expected, "unexpected audit log");
    }

    /// Assert that the audit log holds only `request.error` entries.
    pub fn assert_only_request_errors(entries: &[AuditEntry]) {
        assert!(
            entries.iter().all(|e| e.action_kind == REQUEST_ERROR_ACTION),
            "expected only request.error entries, got {:?}",
            entries.iter().map(|e| &e.action_kind).collect::<Vec<_>>()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_linked_batch_refs_its_alias((alias, actions) in generators::arb_linked_batch(5)) {
            prop_assert_eq!(actions[0]["saveAs"].as_str(), Some(alias.as_str()));
            for task in &actions[1..] {
                prop_assert_eq!(task["data"]["doc_ref"].as_str(), Some(alias.as_str()));
            }
        }
    }

    #[test]
    fn test_task_update_by_id_sets_id() {
        let id = uuid::Uuid::now_v7();
        let action = fixtures::task_update_by_id(id, serde_json::json!({ "title": "x" }));
        assert_eq!(action["data"]["id"], id.to_string());
        assert_eq!(action["data"]["title"], "x");
    }
}
