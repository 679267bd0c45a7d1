//! PostgreSQL store tests. Run with `--features db-tests` against a database
//! configured through the `TASKDESK_DB_*` variables.

#![cfg(feature = "db-tests")]

use std::collections::BTreeSet;

use chrono::Utc;
use taskdesk_api::{ApiResult, DbConfig, PgAgentDirectory, PgStore};
use taskdesk_core::{
    new_entity_id, Document, IdempotencyRecord, ScheduleBucket, StorageError, Task, TaskStatus,
};
use taskdesk_storage::{ActionStore, AgentDirectory, TaskUpdate};

async fn test_store() -> ApiResult<(PgStore, PgAgentDirectory)> {
    let pool = DbConfig::from_env().create_pool()?;
    let store = PgStore::new(pool.clone());
    store.migrate().await?;
    Ok((store, PgAgentDirectory::new(pool)))
}

fn make_task(doc_id: Option<uuid::Uuid>) -> Task {
    let now = Utc::now();
    Task {
        id: new_entity_id(),
        title: "pg task".to_string(),
        workspace: "personal".to_string(),
        notes: None,
        status: TaskStatus::Inbox,
        schedule_bucket: ScheduleBucket::None,
        priority: 2,
        scheduled_date: None,
        doc_id,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_committed_rows_are_visible() -> ApiResult<()> {
    let (store, _) = test_store().await?;
    let now = Utc::now();
    let doc = Document {
        id: new_entity_id(),
        title: "pg doc".to_string(),
        content_md: String::new(),
        workspace: "personal".to_string(),
        created_at: now,
        updated_at: now,
    };
    let task = make_task(Some(doc.id));

    let mut tx = store.begin().await?;
    tx.document_insert(&doc).await?;
    tx.task_insert(&task).await?;
    let updated = tx
        .task_update(
            task.id,
            &TaskUpdate {
                notes: Some(Some("hello".to_string())),
                status: Some(TaskStatus::Doing),
                ..TaskUpdate::default()
            },
        )
        .await?;
    assert_eq!(updated.notes.as_deref(), Some("hello"));
    assert_eq!(updated.doc_id, Some(doc.id));
    tx.commit().await?;

    let stored = store.task_get(task.id).await?.expect("task committed");
    assert_eq!(stored.status, TaskStatus::Doing);
    Ok(())
}

#[tokio::test]
async fn test_rollback_discards_rows() -> ApiResult<()> {
    let (store, _) = test_store().await?;
    let task = make_task(None);

    let mut tx = store.begin().await?;
    tx.task_insert(&task).await?;
    tx.rollback().await?;

    assert!(store.task_get(task.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_dangling_doc_is_constraint_violation() -> ApiResult<()> {
    let (store, _) = test_store().await?;
    let mut tx = store.begin().await?;
    let err = tx
        .task_insert(&make_task(Some(new_entity_id())))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation { .. }));
    tx.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn test_duplicate_ledger_key_is_reported() -> ApiResult<()> {
    let (store, _) = test_store().await?;
    let record = IdempotencyRecord {
        key: format!("key-{}", new_entity_id()),
        caller_id: new_entity_id(),
        request_hash: "abc".to_string(),
        response_body: "{}".to_string(),
        created_at: Utc::now(),
    };

    let mut tx = store.begin().await?;
    tx.idempotency_insert(&record).await?;
    tx.commit().await?;

    let mut tx = store.begin().await?;
    let err = tx.idempotency_insert(&record).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateKey { .. }));
    tx.rollback().await?;

    let stored = store
        .idempotency_get(record.caller_id, &record.key)
        .await?
        .expect("ledger record committed");
    assert_eq!(stored.response_body, "{}");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_ledger_insert_loses_as_conflict() -> ApiResult<()> {
    let (store, _) = test_store().await?;
    let record = IdempotencyRecord {
        key: format!("race-{}", new_entity_id()),
        caller_id: new_entity_id(),
        request_hash: "abc".to_string(),
        response_body: "{}".to_string(),
        created_at: Utc::now(),
    };

    let mut winner = store.begin().await?;
    let mut loser = store.begin().await?;
    // Take the loser's snapshot before the winner commits.
    loser.task_get(new_entity_id()).await?;
    winner.idempotency_insert(&record).await?;

    let (inserted, committed) =
        tokio::join!(loser.idempotency_insert(&record), winner.commit());
    committed?;
    let err = inserted.unwrap_err();
    assert!(
        matches!(
            err,
            StorageError::DuplicateKey { .. } | StorageError::SerializationConflict { .. }
        ),
        "unexpected error: {:?}",
        err
    );
    loser.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn test_agent_upsert_keeps_id() -> ApiResult<()> {
    let (_, directory) = test_store().await?;
    let token_hash = format!("hash-{}", new_entity_id());
    let scopes: BTreeSet<String> = ["tasks:write".to_string()].into_iter().collect();

    let first = directory.upsert("pg-agent", &token_hash, &scopes).await?;
    let wider: BTreeSet<String> = ["*".to_string()].into_iter().collect();
    let second = directory.upsert("pg-agent-renamed", &token_hash, &wider).await?;
    assert_eq!(first.agent_id, second.agent_id);

    let found = directory
        .find_by_token_hash(&token_hash)
        .await?
        .expect("agent registered");
    assert_eq!(found.name, "pg-agent-renamed");
    assert!(found.scopes.contains("*"));
    Ok(())
}
