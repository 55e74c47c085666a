//! Transaction boundary for application writes.
//!
//! A [`UnitOfWork`] stages new and loaded entities plus published events.
//! On commit, each [`FlushHook`] sees the dirty entities and may mutate them
//! or append outbox rows; then everything is written in one storage
//! transaction. Any hook error abandons the whole set.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};
use warden_storage::{CommitReceipt, CommitSet, EntityStore, StorageError};
use warden_types::{CallerIdentity, Changeset, Entity, EntityId, NewOutboxEvent, SystemEvent};

use crate::error::GateError;
use crate::outbox::OutboxWriter;

/// Synchronous pre-commit hook.
pub trait FlushHook: Send + Sync {
    fn name(&self) -> &str;

    fn before_flush(&self, flush: &mut FlushContext) -> Result<(), GateError>;
}

/// An entity staged in a unit of work, with its state as loaded.
#[derive(Clone, Debug)]
pub struct StagedEntity {
    entity: Entity,
    original: Option<Entity>,
}

impl StagedEntity {
    pub fn new_entity(entity: Entity) -> Self {
        Self {
            entity,
            original: None,
        }
    }

    pub fn loaded(entity: Entity) -> Self {
        Self {
            original: Some(entity.clone()),
            entity,
        }
    }

    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }

    pub fn original(&self) -> Option<&Entity> {
        self.original.as_ref()
    }

    /// Changes from the loaded state, or every set field for a new entity.
    pub fn changeset(&self) -> Changeset {
        Changeset::between(self.original.as_ref(), &self.entity)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_new() || !self.changeset().is_empty()
    }
}

/// What flush hooks see: the caller, the entities to write, and the
/// outbox rows already buffered for this transaction.
#[derive(Debug)]
pub struct FlushContext {
    identity: CallerIdentity,
    entries: Vec<StagedEntity>,
    outbox: Vec<NewOutboxEvent>,
}

impl FlushContext {
    pub fn new(identity: CallerIdentity, entries: Vec<StagedEntity>) -> Self {
        Self {
            identity,
            entries,
            outbox: Vec::new(),
        }
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    pub fn entries(&self) -> &[StagedEntity] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [StagedEntity] {
        &mut self.entries
    }

    pub fn events(&self) -> &[NewOutboxEvent] {
        &self.outbox
    }

    /// Append rows to the transaction's outbox buffer.
    pub fn append_events(&mut self, events: impl IntoIterator<Item = NewOutboxEvent>) {
        self.outbox.extend(events);
    }

    fn into_commit_set(self) -> CommitSet {
        CommitSet {
            entities: self.entries.into_iter().map(|staged| staged.entity).collect(),
            events: self.outbox,
        }
    }
}

/// Opaque reference to an entity staged in a [`UnitOfWork`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(usize);

/// One application transaction.
pub struct UnitOfWork {
    store: Arc<dyn EntityStore>,
    hooks: Vec<Arc<dyn FlushHook>>,
    writer: OutboxWriter,
    identity: CallerIdentity,
    staged: Vec<StagedEntity>,
    outbox: Vec<NewOutboxEvent>,
}

impl UnitOfWork {
    pub fn new(
        store: Arc<dyn EntityStore>,
        hooks: Vec<Arc<dyn FlushHook>>,
        writer: OutboxWriter,
        identity: CallerIdentity,
    ) -> Self {
        Self {
            store,
            hooks,
            writer,
            identity,
            staged: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Stage a new entity, reserving an id when it has none.
    pub async fn add(&mut self, mut entity: Entity) -> Result<EntityHandle, GateError> {
        if entity.id.is_none() {
            let id = self.store.allocate_entity_id(&entity.domain_key()).await?;
            entity.id = Some(id);
        }
        self.staged.push(StagedEntity::new_entity(entity));
        Ok(EntityHandle(self.staged.len() - 1))
    }

    /// Load a stored entity for modification.
    ///
    /// Loading the same entity twice returns the existing handle.
    pub async fn load(&mut self, domain: &str, id: EntityId) -> Result<EntityHandle, GateError> {
        if let Some(index) = self
            .staged
            .iter()
            .position(|s| s.entity.id == Some(id) && s.entity.domain_key() == domain)
        {
            return Ok(EntityHandle(index));
        }

        let entity = self
            .store
            .get_entity(domain, id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{domain}#{id}")))?;
        self.staged.push(StagedEntity::loaded(entity));
        Ok(EntityHandle(self.staged.len() - 1))
    }

    pub fn get(&self, handle: EntityHandle) -> Result<&Entity, GateError> {
        self.staged
            .get(handle.0)
            .map(StagedEntity::entity)
            .ok_or(GateError::UnknownHandle(handle.0))
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Result<&mut Entity, GateError> {
        self.staged
            .get_mut(handle.0)
            .map(StagedEntity::entity_mut)
            .ok_or(GateError::UnknownHandle(handle.0))
    }

    /// Buffer a system event in this transaction.
    ///
    /// The row becomes visible to the relay only if the transaction commits.
    pub fn publish(
        &mut self,
        event: &SystemEvent,
        payload: Value,
        entity_id: Option<EntityId>,
        partition_key: Option<String>,
    ) {
        let row = self.writer.publish(
            event,
            payload,
            entity_id,
            partition_key,
            self.identity.trace_id.as_deref(),
        );
        debug!(event = %row.event_name, partition_key = %row.partition_key, "Event buffered");
        self.outbox.push(row);
    }

    pub fn pending_events(&self) -> &[NewOutboxEvent] {
        &self.outbox
    }

    /// Run flush hooks, then persist entities and outbox rows atomically.
    ///
    /// Hooks run on the blocking pool so they may block on their own
    /// evaluation without stalling the async workers.
    pub async fn commit(self) -> Result<CommitReceipt, GateError> {
        let Self {
            store,
            hooks,
            identity,
            staged,
            outbox,
            ..
        } = self;

        let dirty: Vec<StagedEntity> = staged.into_iter().filter(StagedEntity::is_dirty).collect();
        if dirty.is_empty() && outbox.is_empty() {
            debug!("Nothing to commit");
            return Ok(CommitReceipt::default());
        }

        let mut flush = FlushContext::new(identity, dirty);
        flush.append_events(outbox);

        for hook in hooks {
            let name = hook.name().to_string();
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = hook.before_flush(&mut flush);
                (flush, result)
            })
            .await
            .map_err(|e| GateError::Hook(format!("{name}: {e}")))?;
            result?;
            flush = returned;
        }

        let set = flush.into_commit_set();
        let (entities, events) = (set.entities.len(), set.events.len());
        let receipt = store.commit(set).await?;
        info!(entities, events, "Unit of work committed");
        Ok(receipt)
    }

    /// Discard everything staged.
    pub fn rollback(self) {
        debug!(
            entities = self.staged.len(),
            events = self.outbox.len(),
            "Unit of work rolled back"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_storage::memory::InMemoryWardenStorage;
    use warden_storage::{OutboxStore, QueryWindow};

    struct Stamp;

    impl FlushHook for Stamp {
        fn name(&self) -> &str {
            "stamp"
        }

        fn before_flush(&self, flush: &mut FlushContext) -> Result<(), GateError> {
            for staged in flush.entries_mut() {
                staged.entity_mut().set_field("stamped", true);
            }
            Ok(())
        }
    }

    struct Veto;

    impl FlushHook for Veto {
        fn name(&self) -> &str {
            "veto"
        }

        fn before_flush(&self, _flush: &mut FlushContext) -> Result<(), GateError> {
            Err(GateError::PolicyViolation(vec!["no".into()]))
        }
    }

    fn unit(store: &Arc<InMemoryWardenStorage>, hooks: Vec<Arc<dyn FlushHook>>) -> UnitOfWork {
        UnitOfWork::new(
            store.clone(),
            hooks,
            OutboxWriter::new("test"),
            CallerIdentity::anonymous(),
        )
    }

    #[tokio::test]
    async fn hooks_mutate_before_persisting() {
        let store = Arc::new(InMemoryWardenStorage::new());
        let mut uow = unit(&store, vec![Arc::new(Stamp)]);
        let handle = uow.add(Entity::new("Order").with_field("total", 5)).await.unwrap();
        let id = uow.get(handle).unwrap().id.unwrap();
        uow.commit().await.unwrap();

        let saved = store.get_entity("ORDER", id).await.unwrap().unwrap();
        assert_eq!(saved.field("stamped"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn hook_error_discards_entities_and_events() {
        let store = Arc::new(InMemoryWardenStorage::new());
        let mut uow = unit(&store, vec![Arc::new(Veto)]);
        let handle = uow.add(Entity::new("Order")).await.unwrap();
        let id = uow.get(handle).unwrap().id.unwrap();
        uow.publish(&SystemEvent::named("ORDER:NOTE").unwrap(), json!({}), Some(id), None);

        assert!(uow.commit().await.is_err());
        assert!(store.get_entity("ORDER", id).await.unwrap().is_none());
        assert!(store
            .list_outbox(None, QueryWindow::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unchanged_loaded_entities_are_not_flushed() {
        let store = Arc::new(InMemoryWardenStorage::new());
        let mut uow = unit(&store, Vec::new());
        let handle = uow.add(Entity::new("Order").with_field("total", 5)).await.unwrap();
        let id = uow.get(handle).unwrap().id.unwrap();
        uow.commit().await.unwrap();

        let mut uow = unit(&store, vec![Arc::new(Veto)]);
        uow.load("ORDER", id).await.unwrap();
        let receipt = uow.commit().await.unwrap();
        assert!(receipt.entity_ids.is_empty());
    }

    #[tokio::test]
    async fn load_is_idempotent_and_missing_rows_error() {
        let store = Arc::new(InMemoryWardenStorage::new());
        let mut uow = unit(&store, Vec::new());
        let handle = uow.add(Entity::new("Order")).await.unwrap();
        let id = uow.get(handle).unwrap().id.unwrap();
        uow.commit().await.unwrap();

        let mut uow = unit(&store, Vec::new());
        let first = uow.load("ORDER", id).await.unwrap();
        let second = uow.load("ORDER", id).await.unwrap();
        assert_eq!(first, second);
        assert!(matches!(
            uow.load("ORDER", 999).await,
            Err(GateError::Storage(StorageError::NotFound(_)))
        ));
        uow.rollback();
    }
}
