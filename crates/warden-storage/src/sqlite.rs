//! SQLite adapter for Warden storage.
//!
//! Entity upserts and outbox inserts share one database transaction, which
//! is what makes the outbox transactional. Timestamps are stored as integer
//! microseconds so ordering by `created_at` is exact.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};
use warden_types::{
    Entity, EntityId, OutboxEvent, OutboxEventId, OutboxStatus, PolicyBinding, PolicyDefinition,
    PolicyGroup, WorkflowDefinition,
};

use crate::model::{CommitReceipt, CommitSet, DeliveryOutcome};
use crate::traits::{CatalogAdmin, EntityStore, GovernanceCatalog, OutboxStore, QueryWindow};
use crate::{StorageError, StorageResult};

/// SQLite-backed storage adapter.
#[derive(Clone)]
pub struct SqliteWardenStorage {
    pool: SqlitePool,
}

impl SqliteWardenStorage {
    /// Connect (creating the database file if missing) and initialize schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 5, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::InvalidInput(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(connect_timeout_secs));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect sqlite: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        debug!(max_connections, "SQLite storage ready");
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS warden_entities (
                domain TEXT NOT NULL,
                id INTEGER NOT NULL,
                type_name TEXT NOT NULL,
                domain_override TEXT,
                fields TEXT NOT NULL,
                attributes TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (domain, id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_sequences (
                domain TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_name TEXT NOT NULL,
                partition_key TEXT NOT NULL DEFAULT 'global',
                trace_id TEXT,
                payload TEXT NOT NULL,
                entity_id INTEGER,
                status TEXT NOT NULL DEFAULT 'PENDING',
                created_at INTEGER NOT NULL,
                processed_at INTEGER,
                retry_count INTEGER NOT NULL DEFAULT 0,
                error_log TEXT
            )
            "#,
            "CREATE INDEX IF NOT EXISTS warden_outbox_pending ON warden_outbox (status, created_at, id)",
            r#"
            CREATE TABLE IF NOT EXISTS warden_policies (
                key TEXT NOT NULL,
                version INTEGER NOT NULL,
                definition TEXT NOT NULL,
                PRIMARY KEY (key, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_policy_groups (
                key TEXT PRIMARY KEY,
                definition TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_policy_bindings (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                target_domain TEXT NOT NULL,
                priority INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                binding TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_workflows (
                domain TEXT NOT NULL,
                scope TEXT NOT NULL,
                version INTEGER NOT NULL,
                is_active INTEGER NOT NULL,
                definition TEXT NOT NULL,
                PRIMARY KEY (domain, scope, version)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS warden_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteWardenStorage {
    async fn allocate_entity_id(&self, domain: &str) -> StorageResult<EntityId> {
        let row = sqlx::query(
            r#"
            INSERT INTO warden_sequences (domain, value) VALUES (?1, 1)
            ON CONFLICT(domain) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(domain)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        row.try_get::<i64, _>("value").map_err(backend)
    }

    async fn get_entity(&self, domain: &str, id: EntityId) -> StorageResult<Option<Entity>> {
        let row = sqlx::query(
            "SELECT id, type_name, domain_override, fields, attributes FROM warden_entities WHERE domain = ?1 AND id = ?2",
        )
        .bind(domain)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(entity_row_to_entity).transpose()
    }

    async fn list_entities(&self, domain: &str, window: QueryWindow) -> StorageResult<Vec<Entity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, type_name, domain_override, fields, attributes
              FROM warden_entities
             WHERE domain = ?1
             ORDER BY id
             LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(domain)
        .bind(window.limit as i64)
        .bind(window.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(entity_row_to_entity).collect()
    }

    async fn commit(&self, set: CommitSet) -> StorageResult<CommitReceipt> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut receipt = CommitReceipt::default();
        let now = to_micros(Utc::now());

        for entity in set.entities {
            let id = entity.id.ok_or_else(|| {
                StorageError::InvalidInput(format!("entity of type {} has no id", entity.type_name))
            })?;
            let domain = entity.domain_key();
            let fields = serde_json::to_string(&entity.fields)?;
            let attributes = entity
                .attributes
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO warden_entities (domain, id, type_name, domain_override, fields, attributes, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(domain, id) DO UPDATE SET
                    type_name = excluded.type_name,
                    domain_override = excluded.domain_override,
                    fields = excluded.fields,
                    attributes = excluded.attributes,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&domain)
            .bind(id)
            .bind(&entity.type_name)
            .bind(entity.domain_override.as_deref())
            .bind(fields)
            .bind(attributes)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            sqlx::query(
                r#"
                INSERT INTO warden_sequences (domain, value) VALUES (?1, ?2)
                ON CONFLICT(domain) DO UPDATE SET value = MAX(value, excluded.value)
                "#,
            )
            .bind(&domain)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            receipt.entity_ids.push((domain, id));
        }

        for event in set.events {
            let payload = serde_json::to_string(&event.payload)?;
            let row = sqlx::query(
                r#"
                INSERT INTO warden_outbox
                    (event_name, partition_key, trace_id, payload, entity_id, status, created_at, retry_count)
                VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, 0)
                RETURNING id
                "#,
            )
            .bind(&event.event_name)
            .bind(&event.partition_key)
            .bind(event.trace_id.as_deref())
            .bind(payload)
            .bind(event.entity_id)
            .bind(to_micros(event.created_at))
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
            receipt
                .event_ids
                .push(row.try_get::<i64, _>("id").map_err(backend)?);
        }

        tx.commit().await.map_err(backend)?;
        debug!(
            entities = receipt.entity_ids.len(),
            events = receipt.event_ids.len(),
            "Commit persisted"
        );
        Ok(receipt)
    }
}

const OUTBOX_COLUMNS: &str = "id, event_name, partition_key, trace_id, payload, entity_id, status, created_at, processed_at, retry_count, error_log";

#[async_trait]
impl OutboxStore for SqliteWardenStorage {
    async fn pending_outbox(&self, limit: usize) -> StorageResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM warden_outbox WHERE status = 'PENDING' ORDER BY created_at, id LIMIT ?1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(outbox_row_to_event).collect()
    }

    async fn settle_outbox(&self, outcomes: Vec<DeliveryOutcome>) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for outcome in outcomes {
            match outcome {
                DeliveryOutcome::Delivered { id, status, at } => {
                    sqlx::query(
                        r#"
                        UPDATE warden_outbox
                           SET status = ?1, processed_at = ?2, error_log = NULL
                         WHERE id = ?3 AND status = 'PENDING'
                        "#,
                    )
                    .bind(status.as_str())
                    .bind(to_micros(at))
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                }
                DeliveryOutcome::Failed { id, error } => {
                    sqlx::query(
                        r#"
                        UPDATE warden_outbox
                           SET status = 'FAILED', retry_count = retry_count + 1, error_log = ?1
                         WHERE id = ?2 AND status = 'PENDING'
                        "#,
                    )
                    .bind(error)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                }
            }
        }
        tx.commit().await.map_err(backend)
    }

    async fn get_outbox_event(&self, id: OutboxEventId) -> StorageResult<Option<OutboxEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM warden_outbox WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(outbox_row_to_event).transpose()
    }

    async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {OUTBOX_COLUMNS} FROM warden_outbox
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at, id
             LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(window.limit as i64)
        .bind(window.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(outbox_row_to_event).collect()
    }

    async fn requeue_failed(&self, ids: &[OutboxEventId]) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut requeued = 0;
        for id in ids {
            let result = sqlx::query(
                "UPDATE warden_outbox SET status = 'PENDING' WHERE id = ?1 AND status = 'FAILED'",
            )
            .bind(*id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
            requeued += result.rows_affected() as usize;
        }
        tx.commit().await.map_err(backend)?;
        info!(requested = ids.len(), requeued, "Failed outbox rows requeued");
        Ok(requeued)
    }
}

#[async_trait]
impl GovernanceCatalog for SqliteWardenStorage {
    async fn active_bindings(&self, domain: &str) -> StorageResult<Vec<PolicyBinding>> {
        let rows = sqlx::query(
            r#"
            SELECT binding FROM warden_policy_bindings
             WHERE target_domain = ?1 AND is_active = 1
             ORDER BY priority DESC, seq ASC
            "#,
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(|row| json_column(&row, "binding")).collect()
    }

    async fn latest_policy(&self, key: &str) -> StorageResult<Option<PolicyDefinition>> {
        let row = sqlx::query(
            "SELECT definition FROM warden_policies WHERE key = ?1 ORDER BY version DESC LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|row| json_column(&row, "definition")).transpose()
    }

    async fn policy_group(&self, key: &str) -> StorageResult<Option<PolicyGroup>> {
        let row = sqlx::query("SELECT definition FROM warden_policy_groups WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|row| json_column(&row, "definition")).transpose()
    }

    async fn active_workflows(&self, domain: &str) -> StorageResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query(
            "SELECT definition FROM warden_workflows WHERE domain = ?1 AND is_active = 1 ORDER BY scope",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(|row| json_column(&row, "definition"))
            .collect()
    }

    async fn config_values(&self) -> StorageResult<Map<String, Value>> {
        let rows = sqlx::query("SELECT key, value FROM warden_config ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        let mut values = Map::new();
        for row in rows {
            let key: String = row.try_get("key").map_err(backend)?;
            values.insert(key, json_column(&row, "value")?);
        }
        Ok(values)
    }
}

#[async_trait]
impl CatalogAdmin for SqliteWardenStorage {
    async fn register_policy(&self, mut policy: PolicyDefinition) -> StorageResult<PolicyDefinition> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM warden_policies WHERE key = ?1")
                .bind(&policy.key)
                .fetch_one(&mut *tx)
                .await
                .map_err(backend)?;
        policy.version = latest.unwrap_or(0) as u32 + 1;

        sqlx::query("INSERT INTO warden_policies (key, version, definition) VALUES (?1, ?2, ?3)")
            .bind(&policy.key)
            .bind(policy.version as i64)
            .bind(serde_json::to_string(&policy)?)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(policy)
    }

    async fn policy_versions(&self, key: &str) -> StorageResult<Vec<PolicyDefinition>> {
        let rows = sqlx::query("SELECT definition FROM warden_policies WHERE key = ?1 ORDER BY version")
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter()
            .map(|row| json_column(&row, "definition"))
            .collect()
    }

    async fn register_group(&self, group: PolicyGroup) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO warden_policy_groups (key, definition) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET definition = excluded.definition
            "#,
        )
        .bind(&group.key)
        .bind(serde_json::to_string(&group)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn bind(&self, binding: PolicyBinding) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO warden_policy_bindings (target_domain, priority, is_active, binding) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&binding.target_domain)
        .bind(binding.priority)
        .bind(binding.is_active)
        .bind(serde_json::to_string(&binding)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn register_workflow(
        &self,
        mut workflow: WorkflowDefinition,
    ) -> StorageResult<WorkflowDefinition> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let latest: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM warden_workflows WHERE domain = ?1 AND scope = ?2",
        )
        .bind(&workflow.domain)
        .bind(&workflow.scope)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        workflow.version = latest.unwrap_or(0) as u32 + 1;

        if workflow.is_active {
            // Deactivate in both the column and the stored definition.
            let rows = sqlx::query(
                "SELECT version, definition FROM warden_workflows WHERE domain = ?1 AND scope = ?2 AND is_active = 1",
            )
            .bind(&workflow.domain)
            .bind(&workflow.scope)
            .fetch_all(&mut *tx)
            .await
            .map_err(backend)?;
            for row in rows {
                let version: i64 = row.try_get("version").map_err(backend)?;
                let mut previous: WorkflowDefinition = json_column(&row, "definition")?;
                previous.is_active = false;
                sqlx::query(
                    "UPDATE warden_workflows SET is_active = 0, definition = ?1 WHERE domain = ?2 AND scope = ?3 AND version = ?4",
                )
                .bind(serde_json::to_string(&previous)?)
                .bind(&workflow.domain)
                .bind(&workflow.scope)
                .bind(version)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
        }

        sqlx::query(
            "INSERT INTO warden_workflows (domain, scope, version, is_active, definition) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&workflow.domain)
        .bind(&workflow.scope)
        .bind(workflow.version as i64)
        .bind(workflow.is_active)
        .bind(serde_json::to_string(&workflow)?)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(workflow)
    }

    async fn set_config_value(&self, key: &str, value: Value) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO warden_config (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(&value)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::Serialization(format!("timestamp out of range: {micros}")))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> StorageResult<T> {
    let text: String = row.try_get(column).map_err(backend)?;
    Ok(serde_json::from_str(&text)?)
}

fn entity_row_to_entity(row: SqliteRow) -> StorageResult<Entity> {
    let attributes: Option<String> = row.try_get("attributes").map_err(backend)?;
    Ok(Entity {
        id: Some(row.try_get("id").map_err(backend)?),
        type_name: row.try_get("type_name").map_err(backend)?,
        domain_override: row.try_get("domain_override").map_err(backend)?,
        fields: json_column(&row, "fields")?,
        attributes: attributes
            .map(|text| serde_json::from_str(&text))
            .transpose()?,
    })
}

fn outbox_row_to_event(row: SqliteRow) -> StorageResult<OutboxEvent> {
    let status: String = row.try_get("status").map_err(backend)?;
    let processed_at: Option<i64> = row.try_get("processed_at").map_err(backend)?;
    let retry_count: i64 = row.try_get("retry_count").map_err(backend)?;
    Ok(OutboxEvent {
        id: row.try_get("id").map_err(backend)?,
        event_name: row.try_get("event_name").map_err(backend)?,
        partition_key: row.try_get("partition_key").map_err(backend)?,
        trace_id: row.try_get("trace_id").map_err(backend)?,
        payload: json_column(&row, "payload")?,
        entity_id: row.try_get("entity_id").map_err(backend)?,
        status: OutboxStatus::from_str(&status)
            .map_err(|e| StorageError::Serialization(e.to_string()))?,
        created_at: from_micros(row.try_get("created_at").map_err(backend)?)?,
        processed_at: processed_at.map(from_micros).transpose()?,
        retry_count: retry_count.max(0) as u32,
        error_log: row.try_get("error_log").map_err(backend)?,
    })
}
