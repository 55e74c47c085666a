use async_trait::async_trait;
use serde_json::{Map, Value};
use warden_types::{
    Entity, EntityId, OutboxEvent, OutboxEventId, OutboxStatus, PolicyBinding, PolicyDefinition,
    PolicyGroup, WorkflowDefinition,
};

use crate::model::{CommitReceipt, CommitSet, DeliveryOutcome};
use crate::StorageResult;

/// Generic query window for paged reads.
#[derive(Debug, Clone, Copy)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Storage interface for business records.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Reserve the next identifier for a domain.
    async fn allocate_entity_id(&self, domain: &str) -> StorageResult<EntityId>;

    async fn get_entity(&self, domain: &str, id: EntityId) -> StorageResult<Option<Entity>>;

    /// List a domain's entities in id order.
    async fn list_entities(&self, domain: &str, window: QueryWindow) -> StorageResult<Vec<Entity>>;

    /// Upsert entities and append outbox rows in one transaction.
    ///
    /// Either every entity and every event is persisted, or none is.
    async fn commit(&self, set: CommitSet) -> StorageResult<CommitReceipt>;
}

/// Storage interface for the durable outbox queue.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` PENDING rows, oldest first.
    async fn pending_outbox(&self, limit: usize) -> StorageResult<Vec<OutboxEvent>>;

    /// Apply a batch of delivery outcomes in one transaction.
    ///
    /// Rows that are no longer PENDING are left untouched.
    async fn settle_outbox(&self, outcomes: Vec<DeliveryOutcome>) -> StorageResult<()>;

    async fn get_outbox_event(&self, id: OutboxEventId) -> StorageResult<Option<OutboxEvent>>;

    /// List rows oldest first, optionally filtered by status.
    async fn list_outbox(
        &self,
        status: Option<OutboxStatus>,
        window: QueryWindow,
    ) -> StorageResult<Vec<OutboxEvent>>;

    /// Return FAILED rows to PENDING. Retry counts are kept.
    async fn requeue_failed(&self, ids: &[OutboxEventId]) -> StorageResult<usize>;
}

/// Read side of the governance catalog, used by evaluation.
#[async_trait]
pub trait GovernanceCatalog: Send + Sync {
    /// Active bindings for a domain, highest priority first.
    ///
    /// Bindings with equal priority keep registration order.
    async fn active_bindings(&self, domain: &str) -> StorageResult<Vec<PolicyBinding>>;

    /// Latest registered version of a policy key.
    async fn latest_policy(&self, key: &str) -> StorageResult<Option<PolicyDefinition>>;

    async fn policy_group(&self, key: &str) -> StorageResult<Option<PolicyGroup>>;

    /// Active workflow definitions for a domain, one per scope.
    async fn active_workflows(&self, domain: &str) -> StorageResult<Vec<WorkflowDefinition>>;

    /// All config key-values.
    async fn config_values(&self) -> StorageResult<Map<String, Value>>;
}

/// Write side of the governance catalog.
#[async_trait]
pub trait CatalogAdmin: Send + Sync {
    /// Store a new version of a policy; the new version becomes latest.
    async fn register_policy(&self, policy: PolicyDefinition) -> StorageResult<PolicyDefinition>;

    /// Every stored version of a key, oldest first.
    async fn policy_versions(&self, key: &str) -> StorageResult<Vec<PolicyDefinition>>;

    /// Create or replace a policy group.
    async fn register_group(&self, group: PolicyGroup) -> StorageResult<()>;

    async fn bind(&self, binding: PolicyBinding) -> StorageResult<()>;

    /// Store a new workflow version and deactivate the previous one for the
    /// same (domain, scope).
    async fn register_workflow(
        &self,
        workflow: WorkflowDefinition,
    ) -> StorageResult<WorkflowDefinition>;

    async fn set_config_value(&self, key: &str, value: Value) -> StorageResult<()>;
}

/// Unified storage bundle used by the pipeline and its relays.
pub trait WardenStorage:
    EntityStore + OutboxStore + GovernanceCatalog + CatalogAdmin + Send + Sync
{
}

impl<T> WardenStorage for T where
    T: EntityStore + OutboxStore + GovernanceCatalog + CatalogAdmin + Send + Sync
{
}
