//! In-memory reference implementation of the Warden storage traits.
//!
//! Deterministic and test-friendly. Entities and outbox rows share one lock
//! so a commit is all-or-nothing; catalog data lives behind its own lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};
use warden_types::{
    Entity, EntityId, OutboxEvent, OutboxEventId, OutboxStatus, PolicyBinding, PolicyDefinition,
    PolicyGroup, WorkflowDefinition,
};

use crate::model::{CommitReceipt, CommitSet, DeliveryOutcome};
use crate::traits::{CatalogAdmin, EntityStore, GovernanceCatalog, OutboxStore, QueryWindow};
use crate::{StorageError, StorageResult};

#[derive(Default)]
struct DataTables {
    entities: BTreeMap<(String, EntityId), Entity>,
    sequences: HashMap<String, EntityId>,
    outbox: BTreeMap<OutboxEventId, OutboxEvent>,
    next_event_id: OutboxEventId,
}

#[derive(Default)]
struct CatalogTables {
    policies: HashMap<String, Vec<PolicyDefinition>>,
    groups: HashMap<String, PolicyGroup>,
    bindings: Vec<PolicyBinding>,
    workflows: Vec<WorkflowDefinition>,
    config: Map<String, Value>,
}

/// In-memory Warden storage adapter.
#[derive(Default)]
pub struct InMemoryWardenStorage {
    data: RwLock<DataTables>,
    catalog: RwLock<CatalogTables>,
}

impl InMemoryWardenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn data_read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, DataTables>> {
        self.data
            .read()
            .map_err(|_| StorageError::Backend("data lock poisoned".to_string()))
    }

    fn data_write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, DataTables>> {
        self.data
            .write()
            .map_err(|_| StorageError::Backend("data lock poisoned".to_string()))
    }

    fn catalog_read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, CatalogTables>> {
        self.catalog
            .read()
            .map_err(|_| StorageError::Backend("catalog lock poisoned".to_string()))
    }

    fn catalog_write(&self) -> StorageResult<std::sync::RwLockWriteGuard<'_, CatalogTables>> {
        self.catalog
            .write()
            .map_err(|_| StorageError::Backend("catalog lock poisoned".to_string()))
    }
}

#[async_trait]
impl EntityStore for InMemoryWardenStorage {
    async fn allocate_entity_id(&self, domain: &str) -> StorageResult<EntityId> {
        let mut guard = self.data_write()?;
        let next = guard.sequences.entry(domain.to_string()).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn get_entity(&self, domain: &str, id: EntityId) -> StorageResult<Option<Entity>> {
        let guard = self.data_read()?;
        Ok(guard.entities.get(&(domain.to_string(), id)).cloned())
    }

    async fn list_entities(&self, domain: &str, window: QueryWindow) -> StorageResult<Vec<Entity>> {
        let guard = self.data_read()?;
        let rows: Vec<Entity> = guard
            .entities
            .iter()
            .filter(|((d, _), _)| d == domain)
            .map(|(_, entity)| entity.clone())
            .collect();
        Ok(apply_window(rows, window))
    }

    async fn commit(&self, set: CommitSet) -> StorageResult<CommitReceipt> {
        // Validate everything before touching the tables.
        let mut keyed = Vec::with_capacity(set.entities.len());
        for entity in set.entities {
            let id = entity.id.ok_or_else(|| {
                StorageError::InvalidInput(format!(
                    "entity of type {} has no id",
                    entity.type_name
                ))
            })?;
            keyed.push(((entity.domain_key(), id), entity));
        }

        let mut guard = self.data_write()?;
        let mut receipt = CommitReceipt::default();

        for ((domain, id), entity) in keyed {
            let seq = guard.sequences.entry(domain.clone()).or_insert(0);
            *seq = (*seq).max(id);
            guard.entities.insert((domain.clone(), id), entity);
            receipt.entity_ids.push((domain, id));
        }
        for event in set.events {
            guard.next_event_id += 1;
            let id = guard.next_event_id;
            guard.outbox.insert(id, OutboxEvent::from_new(id, event));
            receipt.event_ids.push(id);
        }

        Ok(receipt)
    }
}

#[async_trait]
impl OutboxStore for InMemoryWardenStorage {
    async fn pending_outbox(&self, limit: usize) -> StorageResult<Vec<OutboxEvent>> {
        let guard = self.data_read()?;
        let mut pending: Vec<OutboxEvent> = guard
            .outbox
            .values()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn settle_outbox(&self, outcomes: Vec<DeliveryOutcome>) -> StorageResult<()> {
        let mut guard = self.data_write()?;
        for outcome in outcomes {
            let Some(row) = guard.outbox.get_mut(&outcome.id()) else {
                continue;
            };
            if row.status != OutboxStatus::Pending {
                continue;
            }
            match outcome {
                DeliveryOutcome::Delivered { status, at, .. } => {
                    row.status = status;
                    row.processed_at = Some(at);
                    row.error_log = None;
                }
                DeliveryOutcome::Failed { error, .. } => {
                    row.status = OutboxStatus::Failed;
                    row.retry_count += 1;
                    row.error_log = Some(error);
                }
            }
        }
        Ok(())
    }

    async fn get_outbox_event(&self, id: OutboxEventId) -> StorageResult<Option<OutboxEvent>> {
        let guard = self.data_read()?;
        Ok(guard.outbox.get(&id).cloned())
    }

    async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<OutboxEvent>> {
        let guard = self.data_read()?;
        let mut rows: Vec<OutboxEvent> = guard
            .outbox
            .values()
            .filter(|e| status.map(|s| e.status == s).unwrap_or(true))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(apply_window(rows, window))
    }

    async fn requeue_failed(&self, ids: &[OutboxEventId]) -> StorageResult<usize> {
        let mut guard = self.data_write()?;
        let mut requeued = 0;
        for id in ids {
            if let Some(row) = guard.outbox.get_mut(id) {
                if row.status == OutboxStatus::Failed {
                    row.status = OutboxStatus::Pending;
                    requeued += 1;
                }
            }
        }
        Ok(requeued)
    }
}

#[async_trait]
impl GovernanceCatalog for InMemoryWardenStorage {
    async fn active_bindings(&self, domain: &str) -> StorageResult<Vec<PolicyBinding>> {
        let guard = self.catalog_read()?;
        let mut bindings: Vec<PolicyBinding> = guard
            .bindings
            .iter()
            .filter(|b| b.is_active && b.target_domain == domain)
            .cloned()
            .collect();
        // Stable sort keeps registration order among equal priorities.
        bindings.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(bindings)
    }

    async fn latest_policy(&self, key: &str) -> StorageResult<Option<PolicyDefinition>> {
        let guard = self.catalog_read()?;
        Ok(guard
            .policies
            .get(key)
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn policy_group(&self, key: &str) -> StorageResult<Option<PolicyGroup>> {
        let guard = self.catalog_read()?;
        Ok(guard.groups.get(key).cloned())
    }

    async fn active_workflows(&self, domain: &str) -> StorageResult<Vec<WorkflowDefinition>> {
        let guard = self.catalog_read()?;
        Ok(guard
            .workflows
            .iter()
            .filter(|w| w.is_active && w.domain == domain)
            .cloned()
            .collect())
    }

    async fn config_values(&self) -> StorageResult<Map<String, Value>> {
        let guard = self.catalog_read()?;
        Ok(guard.config.clone())
    }
}

#[async_trait]
impl CatalogAdmin for InMemoryWardenStorage {
    async fn register_policy(&self, mut policy: PolicyDefinition) -> StorageResult<PolicyDefinition> {
        let mut guard = self.catalog_write()?;
        let versions = guard.policies.entry(policy.key.clone()).or_default();
        policy.version = versions.last().map(|p| p.version + 1).unwrap_or(1);
        versions.push(policy.clone());
        Ok(policy)
    }

    async fn policy_versions(&self, key: &str) -> StorageResult<Vec<PolicyDefinition>> {
        let guard = self.catalog_read()?;
        Ok(guard.policies.get(key).cloned().unwrap_or_default())
    }

    async fn register_group(&self, group: PolicyGroup) -> StorageResult<()> {
        let mut guard = self.catalog_write()?;
        guard.groups.insert(group.key.clone(), group);
        Ok(())
    }

    async fn bind(&self, binding: PolicyBinding) -> StorageResult<()> {
        let mut guard = self.catalog_write()?;
        guard.bindings.push(binding);
        Ok(())
    }

    async fn register_workflow(
        &self,
        mut workflow: WorkflowDefinition,
    ) -> StorageResult<WorkflowDefinition> {
        let mut guard = self.catalog_write()?;
        let mut latest = 0;
        for existing in guard
            .workflows
            .iter_mut()
            .filter(|w| w.domain == workflow.domain && w.scope == workflow.scope)
        {
            latest = latest.max(existing.version);
            if workflow.is_active {
                existing.is_active = false;
            }
        }
        workflow.version = latest + 1;
        guard.workflows.push(workflow.clone());
        Ok(workflow)
    }

    async fn set_config_value(&self, key: &str, value: Value) -> StorageResult<()> {
        let mut guard = self.catalog_write()?;
        guard.config.insert(key.to_string(), value);
        Ok(())
    }
}

fn apply_window<T>(rows: Vec<T>, window: QueryWindow) -> Vec<T> {
    rows.into_iter()
        .skip(window.offset)
        .take(window.limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use warden_types::{EventMeta, EventPayload, NewOutboxEvent};

    fn event(name: &str, offset_ms: i64) -> NewOutboxEvent {
        let at = Utc::now() + Duration::milliseconds(offset_ms);
        NewOutboxEvent {
            event_name: name.to_string(),
            partition_key: "global".to_string(),
            trace_id: None,
            payload: EventPayload {
                meta: EventMeta {
                    version: "1.0.0".to_string(),
                    timestamp: at,
                    source: "test".to_string(),
                    trace_id: "system".to_string(),
                },
                data: json!({}),
            },
            entity_id: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn commit_writes_entities_and_events_together() {
        let store = InMemoryWardenStorage::new();
        let id = store.allocate_entity_id("ORDER").await.unwrap();
        let entity = Entity::new("Order").with_id(id).with_field("status", "DRAFT");

        let receipt = store
            .commit(CommitSet {
                entities: vec![entity.clone()],
                events: vec![event("ORDER:CREATED", 0)],
            })
            .await
            .unwrap();

        assert_eq!(receipt.entity_ids, vec![("ORDER".to_string(), id)]);
        assert_eq!(receipt.event_ids.len(), 1);
        assert_eq!(store.get_entity("ORDER", id).await.unwrap(), Some(entity));
        let row = store.get_outbox_event(receipt.event_ids[0]).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn commit_rejects_entities_without_id_and_writes_nothing() {
        let store = InMemoryWardenStorage::new();
        let result = store
            .commit(CommitSet {
                entities: vec![Entity::new("Order")],
                events: vec![event("ORDER:CREATED", 0)],
            })
            .await;
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_ids_advance_the_sequence() {
        let store = InMemoryWardenStorage::new();
        store
            .commit(CommitSet {
                entities: vec![Entity::new("Order").with_id(40)],
                events: vec![],
            })
            .await
            .unwrap();
        assert_eq!(store.allocate_entity_id("ORDER").await.unwrap(), 41);
    }

    #[tokio::test]
    async fn pending_batch_is_oldest_first_and_settles_once() {
        let store = InMemoryWardenStorage::new();
        let receipt = store
            .commit(CommitSet {
                entities: vec![],
                events: vec![event("A:LATE", 50), event("A:EARLY", 0), event("A:MID", 10)],
            })
            .await
            .unwrap();

        let pending = store.pending_outbox(2).await.unwrap();
        let names: Vec<_> = pending.iter().map(|e| e.event_name.as_str()).collect();
        assert_eq!(names, vec!["A:EARLY", "A:MID"]);

        let now = Utc::now();
        store
            .settle_outbox(vec![
                DeliveryOutcome::Delivered {
                    id: pending[0].id,
                    status: OutboxStatus::Published,
                    at: now,
                },
                DeliveryOutcome::Failed {
                    id: pending[1].id,
                    error: "broker down".to_string(),
                },
            ])
            .await
            .unwrap();

        let published = store.get_outbox_event(pending[0].id).await.unwrap().unwrap();
        assert_eq!(published.status, OutboxStatus::Published);
        assert_eq!(published.processed_at, Some(now));

        let failed = store.get_outbox_event(pending[1].id).await.unwrap().unwrap();
        assert_eq!(failed.status, OutboxStatus::Failed);
        assert_eq!(failed.retry_count, 1);
        assert_eq!(failed.error_log.as_deref(), Some("broker down"));

        // FAILED rows are not re-selected; only the untouched row remains.
        let remaining = store.pending_outbox(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, receipt.event_ids[0]);

        // Settling an already-settled row is a no-op.
        store
            .settle_outbox(vec![DeliveryOutcome::Failed {
                id: pending[0].id,
                error: "late".to_string(),
            }])
            .await
            .unwrap();
        let still = store.get_outbox_event(pending[0].id).await.unwrap().unwrap();
        assert_eq!(still.status, OutboxStatus::Published);
    }

    #[tokio::test]
    async fn requeue_returns_failed_rows_to_pending() {
        let store = InMemoryWardenStorage::new();
        let receipt = store
            .commit(CommitSet {
                entities: vec![],
                events: vec![event("A:ONE", 0)],
            })
            .await
            .unwrap();
        let id = receipt.event_ids[0];
        store
            .settle_outbox(vec![DeliveryOutcome::Failed {
                id,
                error: "x".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(store.requeue_failed(&[id, 999]).await.unwrap(), 1);
        let row = store.get_outbox_event(id).await.unwrap().unwrap();
        assert_eq!(row.status, OutboxStatus::Pending);
        assert_eq!(row.retry_count, 1);
    }

    #[tokio::test]
    async fn bindings_are_ordered_by_priority_then_registration() {
        let store = InMemoryWardenStorage::new();
        store.bind(PolicyBinding::policy("ORDER", "low", 1)).await.unwrap();
        store.bind(PolicyBinding::policy("ORDER", "high", 10)).await.unwrap();
        store.bind(PolicyBinding::policy("ORDER", "low_second", 1)).await.unwrap();
        store.bind(PolicyBinding::policy("USER", "other", 50)).await.unwrap();

        let keys: Vec<_> = store
            .active_bindings("ORDER")
            .await
            .unwrap()
            .into_iter()
            .map(|b| match b.target {
                warden_types::BindingTarget::Policy(k) | warden_types::BindingTarget::Group(k) => k,
            })
            .collect();
        assert_eq!(keys, vec!["high", "low", "low_second"]);
    }

    #[tokio::test]
    async fn policy_and_workflow_versioning() {
        let store = InMemoryWardenStorage::new();
        let v1 = store.register_policy(PolicyDefinition::new("limit")).await.unwrap();
        let v2 = store.register_policy(PolicyDefinition::new("limit")).await.unwrap();
        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(store.latest_policy("limit").await.unwrap().unwrap().version, 2);
        assert_eq!(store.policy_versions("limit").await.unwrap().len(), 2);

        let first = WorkflowDefinition::new("flow", "ORDER", "DRAFT");
        store.register_workflow(first.clone()).await.unwrap();
        let second = store.register_workflow(first).await.unwrap();
        assert_eq!(second.version, 2);
        let active = store.active_workflows("ORDER").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].version, 2);
    }
}
