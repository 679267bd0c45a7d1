//! Database Connection Pool Module
//!
//! PostgreSQL implementation of the storage traits, backed by a
//! deadpool-postgres pool. Batch transactions run at SERIALIZABLE isolation on
//! a dedicated pooled connection.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use taskdesk_core::{
    new_entity_id, AgentCredential, Attachment, AuditEntry, Document, EntityId, EntityType,
    Event, IdempotencyRecord, StorageError, StorageResult, Task,
};
use taskdesk_storage::{
    ActionStore, AgentDirectory, DocumentUpdate, StorageStatistics, StoreTransaction, TaskUpdate,
};
use tokio_postgres::{error::SqlState, NoTls, Row};

use crate::error::{ApiError, ApiResult};

const SCHEMA_SQL: &str = include_str!("../sql/schema.sql");

const TASK_COLUMNS: &str = "id, title, workspace, notes, status, schedule_bucket, priority, \
     scheduled_date, doc_id, created_at, updated_at";
const DOC_COLUMNS: &str = "id, title, content_md, workspace, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, title, starts_at, ends_at, location, notes, created_at";
const ATTACHMENT_COLUMNS: &str =
    "id, task_id, doc_id, filename, mime_type, size_bytes, storage_key, created_at";
const AUDIT_COLUMNS: &str = "id, caller_id, action_kind, payload, result, created_at";

// ============================================================================
// DATABASE CONFIGURATION
// ============================================================================

/// Database connection configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait timeout for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "taskdesk".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("TASKDESK_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("TASKDESK_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("TASKDESK_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("TASKDESK_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("TASKDESK_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TASKDESK_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("TASKDESK_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: deadpool_postgres::PoolError) -> StorageError {
    StorageError::Unavailable {
        reason: err.to_string(),
    }
}

fn map_pg_error(entity_type: EntityType, err: tokio_postgres::Error) -> StorageError {
    if let Some(db) = err.as_db_error() {
        let code = db.code();
        if *code == SqlState::FOREIGN_KEY_VIOLATION
            || *code == SqlState::CHECK_VIOLATION
            || *code == SqlState::NOT_NULL_VIOLATION
            || *code == SqlState::UNIQUE_VIOLATION
        {
            return StorageError::ConstraintViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
                reason: db.message().to_string(),
            };
        }
        if *code == SqlState::T_R_SERIALIZATION_FAILURE || *code == SqlState::T_R_DEADLOCK_DETECTED {
            return StorageError::SerializationConflict {
                reason: db.message().to_string(),
            };
        }
        if *code == SqlState::IN_FAILED_SQL_TRANSACTION {
            return StorageError::TransactionFailed {
                reason: db.message().to_string(),
            };
        }
    }
    if err.is_closed() {
        return StorageError::Unavailable {
            reason: err.to_string(),
        };
    }
    StorageError::InsertFailed {
        entity_type,
        reason: err.to_string(),
    }
}

fn corrupt_row(entity_type: EntityType, reason: impl Into<String>) -> StorageError {
    StorageError::TransactionFailed {
        reason: format!("unreadable {} row: {}", entity_type, reason.into()),
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn task_from_row(row: &Row) -> StorageResult<Task> {
    let map = |e: tokio_postgres::Error| corrupt_row(EntityType::Task, e.to_string());
    let status: String = row.try_get("status").map_err(map)?;
    let bucket: String = row.try_get("schedule_bucket").map_err(map)?;
    Ok(Task {
        id: row.try_get("id").map_err(map)?,
        title: row.try_get("title").map_err(map)?,
        workspace: row.try_get("workspace").map_err(map)?,
        notes: row.try_get("notes").map_err(map)?,
        status: status
            .parse()
            .map_err(|e: String| corrupt_row(EntityType::Task, e))?,
        schedule_bucket: bucket
            .parse()
            .map_err(|e: String| corrupt_row(EntityType::Task, e))?,
        priority: row.try_get("priority").map_err(map)?,
        scheduled_date: row.try_get("scheduled_date").map_err(map)?,
        doc_id: row.try_get("doc_id").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

fn document_from_row(row: &Row) -> StorageResult<Document> {
    let map = |e: tokio_postgres::Error| corrupt_row(EntityType::Document, e.to_string());
    Ok(Document {
        id: row.try_get("id").map_err(map)?,
        title: row.try_get("title").map_err(map)?,
        content_md: row.try_get("content_md").map_err(map)?,
        workspace: row.try_get("workspace").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
        updated_at: row.try_get("updated_at").map_err(map)?,
    })
}

fn event_from_row(row: &Row) -> StorageResult<Event> {
    let map = |e: tokio_postgres::Error| corrupt_row(EntityType::Event, e.to_string());
    Ok(Event {
        id: row.try_get("id").map_err(map)?,
        title: row.try_get("title").map_err(map)?,
        starts_at: row.try_get("starts_at").map_err(map)?,
        ends_at: row.try_get("ends_at").map_err(map)?,
        location: row.try_get("location").map_err(map)?,
        notes: row.try_get("notes").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
    })
}

fn attachment_from_row(row: &Row) -> StorageResult<Attachment> {
    let map = |e: tokio_postgres::Error| corrupt_row(EntityType::Attachment, e.to_string());
    Ok(Attachment {
        id: row.try_get("id").map_err(map)?,
        task_id: row.try_get("task_id").map_err(map)?,
        doc_id: row.try_get("doc_id").map_err(map)?,
        filename: row.try_get("filename").map_err(map)?,
        mime_type: row.try_get("mime_type").map_err(map)?,
        size_bytes: row.try_get("size_bytes").map_err(map)?,
        storage_key: row.try_get("storage_key").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
    })
}

fn audit_from_row(row: &Row) -> StorageResult<AuditEntry> {
    let map = |e: tokio_postgres::Error| corrupt_row(EntityType::AuditEntry, e.to_string());
    Ok(AuditEntry {
        id: row.try_get("id").map_err(map)?,
        caller_id: row.try_get("caller_id").map_err(map)?,
        action_kind: row.try_get("action_kind").map_err(map)?,
        payload: row.try_get("payload").map_err(map)?,
        result: row.try_get("result").map_err(map)?,
        created_at: row.try_get("created_at").map_err(map)?,
    })
}

fn agent_from_row(row: &Row) -> StorageResult<AgentCredential> {
    let map = |e: tokio_postgres::Error| corrupt_row(EntityType::Agent, e.to_string());
    let scopes: Vec<String> = row.try_get("scopes").map_err(map)?;
    Ok(AgentCredential {
        agent_id: row.try_get("id").map_err(map)?,
        name: row.try_get("name").map_err(map)?,
        token_hash: row.try_get("token_hash").map_err(map)?,
        scopes: scopes.into_iter().collect(),
        revoked: row.try_get("revoked").map_err(map)?,
    })
}

// ============================================================================
// SHARED STATEMENTS
// ============================================================================

async fn insert_audit(client: &tokio_postgres::Client, entry: &AuditEntry) -> StorageResult<()> {
    client
        .execute(
            "INSERT INTO agent_audit_log (id, caller_id, action_kind, payload, result, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &entry.id,
                &entry.caller_id,
                &entry.action_kind,
                &entry.payload,
                &entry.result,
                &entry.created_at,
            ],
        )
        .await
        .map_err(|e| map_pg_error(EntityType::AuditEntry, e))?;
    Ok(())
}

async fn select_task(client: &tokio_postgres::Client, id: EntityId) -> StorageResult<Option<Task>> {
    let sql = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);
    let row = client
        .query_opt(sql.as_str(), &[&id])
        .await
        .map_err(|e| map_pg_error(EntityType::Task, e))?;
    row.as_ref().map(task_from_row).transpose()
}

async fn select_document(
    client: &tokio_postgres::Client,
    id: EntityId,
) -> StorageResult<Option<Document>> {
    let sql = format!("SELECT {} FROM docs WHERE id = $1", DOC_COLUMNS);
    let row = client
        .query_opt(sql.as_str(), &[&id])
        .await
        .map_err(|e| map_pg_error(EntityType::Document, e))?;
    row.as_ref().map(document_from_row).transpose()
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// [`ActionStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a store from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Create every table the pipeline writes, if missing.
    pub async fn migrate(&self) -> ApiResult<()> {
        let conn = self.pool.get().await?;
        conn.batch_execute(SCHEMA_SQL).await?;
        tracing::info!("Database schema is up to date");
        Ok(())
    }

    async fn conn(&self) -> StorageResult<Object> {
        self.pool.get().await.map_err(pool_error)
    }
}

#[async_trait]
impl ActionStore for PgStore {
    async fn begin(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        let conn = self.conn().await?;
        conn.batch_execute("BEGIN ISOLATION LEVEL SERIALIZABLE")
            .await
            .map_err(|e| StorageError::TransactionFailed {
                reason: e.to_string(),
            })?;
        Ok(Box::new(PgTransaction { conn: Some(conn) }))
    }

    async fn idempotency_get(
        &self,
        caller_id: EntityId,
        key: &str,
    ) -> StorageResult<Option<IdempotencyRecord>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT key, caller_id, request_hash, response_body, created_at \
                 FROM agent_idempotency WHERE caller_id = $1 AND key = $2",
                &[&caller_id, &key],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::IdempotencyRecord, e))?;

        row.map(|row| {
            let map =
                |e: tokio_postgres::Error| corrupt_row(EntityType::IdempotencyRecord, e.to_string());
            Ok(IdempotencyRecord {
                key: row.try_get("key").map_err(map)?,
                caller_id: row.try_get("caller_id").map_err(map)?,
                request_hash: row.try_get("request_hash").map_err(map)?,
                response_body: row.try_get("response_body").map_err(map)?,
                created_at: row.try_get("created_at").map_err(map)?,
            })
        })
        .transpose()
    }

    async fn audit_append(&self, entry: &AuditEntry) -> StorageResult<()> {
        let conn = self.conn().await?;
        insert_audit(&conn, entry).await
    }

    async fn task_get(&self, id: EntityId) -> StorageResult<Option<Task>> {
        let conn = self.conn().await?;
        select_task(&conn, id).await
    }

    async fn document_get(&self, id: EntityId) -> StorageResult<Option<Document>> {
        let conn = self.conn().await?;
        select_document(&conn, id).await
    }

    async fn event_get(&self, id: EntityId) -> StorageResult<Option<Event>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(|e| map_pg_error(EntityType::Event, e))?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn attachment_get(&self, id: EntityId) -> StorageResult<Option<Attachment>> {
        let conn = self.conn().await?;
        let sql = format!("SELECT {} FROM attachments WHERE id = $1", ATTACHMENT_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(|e| map_pg_error(EntityType::Attachment, e))?;
        row.as_ref().map(attachment_from_row).transpose()
    }

    async fn audit_list(&self, caller_id: EntityId) -> StorageResult<Vec<AuditEntry>> {
        let conn = self.conn().await?;
        let sql = format!(
            "SELECT {} FROM agent_audit_log WHERE caller_id = $1 ORDER BY created_at, id",
            AUDIT_COLUMNS
        );
        let rows = conn
            .query(sql.as_str(), &[&caller_id])
            .await
            .map_err(|e| map_pg_error(EntityType::AuditEntry, e))?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn statistics(&self) -> StorageResult<StorageStatistics> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT \
                   (SELECT count(*) FROM tasks), \
                   (SELECT count(*) FROM docs), \
                   (SELECT count(*) FROM events), \
                   (SELECT count(*) FROM attachments), \
                   (SELECT count(*) FROM agent_audit_log), \
                   (SELECT count(*) FROM agent_idempotency)",
                &[],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::AuditEntry, e))?;
        let count = |idx: usize| -> StorageResult<usize> {
            let n: i64 = row
                .try_get(idx)
                .map_err(|e| corrupt_row(EntityType::AuditEntry, e.to_string()))?;
            Ok(usize::try_from(n).unwrap_or_default())
        };
        Ok(StorageStatistics {
            tasks: count(0)?,
            documents: count(1)?,
            events: count(2)?,
            attachments: count(3)?,
            audit_entries: count(4)?,
            idempotency_records: count(5)?,
        })
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A SERIALIZABLE transaction on one pooled connection.
///
/// If dropped before commit or rollback, the connection is detached from the
/// pool and closed, which makes the server abort the transaction.
pub struct PgTransaction {
    conn: Option<Object>,
}

impl PgTransaction {
    fn client(&self) -> StorageResult<&tokio_postgres::Client> {
        self.conn
            .as_deref()
            .map(|wrapper| &**wrapper)
            .ok_or_else(|| StorageError::TransactionFailed {
                reason: "transaction already finished".to_string(),
            })
    }

    /// Run COMMIT or ROLLBACK and hand the connection back to the pool.
    async fn finish(&mut self, statement: &str) -> StorageResult<()> {
        let conn = self.conn.take().ok_or_else(|| StorageError::TransactionFailed {
            reason: "transaction already finished".to_string(),
        })?;
        let result = conn.batch_execute(statement).await;
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                // Connection state is unknown; keep it out of the pool.
                drop(Object::take(conn));
                Err(map_pg_error(EntityType::IdempotencyRecord, e))
            }
        }
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Transaction dropped without commit; discarding connection");
            drop(Object::take(conn));
        }
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn task_get(&mut self, id: EntityId) -> StorageResult<Option<Task>> {
        select_task(self.client()?, id).await
    }

    async fn document_get(&mut self, id: EntityId) -> StorageResult<Option<Document>> {
        select_document(self.client()?, id).await
    }

    async fn task_insert(&mut self, task: &Task) -> StorageResult<()> {
        self.client()?
            .execute(
                "INSERT INTO tasks (id, title, workspace, notes, status, schedule_bucket, priority, \
                 scheduled_date, doc_id, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
                &[
                    &task.id,
                    &task.title,
                    &task.workspace,
                    &task.notes,
                    &task.status.as_str(),
                    &task.schedule_bucket.as_str(),
                    &task.priority,
                    &task.scheduled_date,
                    &task.doc_id,
                    &task.created_at,
                    &task.updated_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Task, e))?;
        Ok(())
    }

    async fn task_update(&mut self, id: EntityId, update: &TaskUpdate) -> StorageResult<Task> {
        let sql = format!(
            "UPDATE tasks SET \
               title = COALESCE($2, title), \
               workspace = COALESCE($3, workspace), \
               notes = CASE WHEN $4 THEN $5 ELSE notes END, \
               status = COALESCE($6, status), \
               schedule_bucket = COALESCE($7, schedule_bucket), \
               priority = COALESCE($8, priority), \
               scheduled_date = CASE WHEN $9 THEN $10 ELSE scheduled_date END, \
               doc_id = CASE WHEN $11 THEN $12 ELSE doc_id END, \
               updated_at = $13 \
             WHERE id = $1 RETURNING {}",
            TASK_COLUMNS
        );
        let notes = update.notes.clone().flatten();
        let scheduled_date = update.scheduled_date.flatten();
        let doc_id = update.doc_id.flatten();
        let status = update.status.map(|s| s.as_str());
        let bucket = update.schedule_bucket.map(|b| b.as_str());

        let row = self
            .client()?
            .query_opt(
                sql.as_str(),
                &[
                    &id,
                    &update.title,
                    &update.workspace,
                    &update.notes.is_some(),
                    &notes,
                    &status,
                    &bucket,
                    &update.priority,
                    &update.scheduled_date.is_some(),
                    &scheduled_date,
                    &update.doc_id.is_some(),
                    &doc_id,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Task, e))?;

        match row {
            Some(row) => task_from_row(&row),
            None => Err(StorageError::NotFound {
                entity_type: EntityType::Task,
                id,
            }),
        }
    }

    async fn document_insert(&mut self, doc: &Document) -> StorageResult<()> {
        self.client()?
            .execute(
                "INSERT INTO docs (id, title, content_md, workspace, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &doc.id,
                    &doc.title,
                    &doc.content_md,
                    &doc.workspace,
                    &doc.created_at,
                    &doc.updated_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Document, e))?;
        Ok(())
    }

    async fn document_update(
        &mut self,
        id: EntityId,
        update: &DocumentUpdate,
    ) -> StorageResult<Document> {
        let sql = format!(
            "UPDATE docs SET \
               title = COALESCE($2, title), \
               content_md = COALESCE($3, content_md), \
               workspace = COALESCE($4, workspace), \
               updated_at = $5 \
             WHERE id = $1 RETURNING {}",
            DOC_COLUMNS
        );
        let row = self
            .client()?
            .query_opt(
                sql.as_str(),
                &[
                    &id,
                    &update.title,
                    &update.content_md,
                    &update.workspace,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Document, e))?;

        match row {
            Some(row) => document_from_row(&row),
            None => Err(StorageError::NotFound {
                entity_type: EntityType::Document,
                id,
            }),
        }
    }

    async fn event_insert(&mut self, event: &Event) -> StorageResult<()> {
        self.client()?
            .execute(
                "INSERT INTO events (id, title, starts_at, ends_at, location, notes, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
                &[
                    &event.id,
                    &event.title,
                    &event.starts_at,
                    &event.ends_at,
                    &event.location,
                    &event.notes,
                    &event.created_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Event, e))?;
        Ok(())
    }

    async fn attachment_insert(&mut self, attachment: &Attachment) -> StorageResult<()> {
        self.client()?
            .execute(
                "INSERT INTO attachments (id, task_id, doc_id, filename, mime_type, size_bytes, \
                 storage_key, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &attachment.id,
                    &attachment.task_id,
                    &attachment.doc_id,
                    &attachment.filename,
                    &attachment.mime_type,
                    &attachment.size_bytes,
                    &attachment.storage_key,
                    &attachment.created_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Attachment, e))?;
        Ok(())
    }

    async fn audit_append(&mut self, entry: &AuditEntry) -> StorageResult<()> {
        insert_audit(self.client()?, entry).await
    }

    async fn idempotency_insert(&mut self, record: &IdempotencyRecord) -> StorageResult<()> {
        let result = self
            .client()?
            .execute(
                "INSERT INTO agent_idempotency (caller_id, key, request_hash, response_body, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &record.caller_id,
                    &record.key,
                    &record.request_hash,
                    &record.response_body,
                    &record.created_at,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StorageError::DuplicateKey {
                    key: record.key.clone(),
                })
            }
            Err(e) => Err(map_pg_error(EntityType::IdempotencyRecord, e)),
        }
    }

    async fn commit(mut self: Box<Self>) -> StorageResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(mut self: Box<Self>) -> StorageResult<()> {
        self.finish("ROLLBACK").await
    }
}

// ============================================================================
// AGENT DIRECTORY
// ============================================================================

/// [`AgentDirectory`] backed by the `agents` table.
#[derive(Clone)]
pub struct PgAgentDirectory {
    pool: Pool,
}

impl PgAgentDirectory {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Register an agent, or refresh its name and scopes if the token is
    /// already known. The agent id of an existing token never changes.
    pub async fn upsert(
        &self,
        name: &str,
        token_hash: &str,
        scopes: &BTreeSet<String>,
    ) -> ApiResult<AgentCredential> {
        let conn = self.pool.get().await?;
        let scopes: Vec<&str> = scopes.iter().map(String::as_str).collect();
        let row = conn
            .query_one(
                "INSERT INTO agents (id, name, token_hash, scopes) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (token_hash) DO UPDATE SET name = EXCLUDED.name, scopes = EXCLUDED.scopes \
                 RETURNING id, name, token_hash, scopes, revoked",
                &[&new_entity_id(), &name, &token_hash, &scopes],
            )
            .await?;
        Ok(agent_from_row(&row)?)
    }
}

#[async_trait]
impl AgentDirectory for PgAgentDirectory {
    async fn find_by_token_hash(&self, token_hash: &str) -> StorageResult<Option<AgentCredential>> {
        let conn = self.pool.get().await.map_err(pool_error)?;
        let row = conn
            .query_opt(
                "SELECT id, name, token_hash, scopes, revoked FROM agents WHERE token_hash = $1",
                &[&token_hash],
            )
            .await
            .map_err(|e| map_pg_error(EntityType::Agent, e))?;
        row.as_ref().map(agent_from_row).transpose()
    }
}
