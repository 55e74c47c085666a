use chrono::{DateTime, Utc};
use warden_types::{Entity, EntityId, NewOutboxEvent, OutboxEventId, OutboxStatus};

/// Everything one unit of work persists: written together or not at all.
#[derive(Clone, Debug, Default)]
pub struct CommitSet {
    /// Entities to upsert; each must carry an id.
    pub entities: Vec<Entity>,
    /// Outbox rows, in emission order.
    pub events: Vec<NewOutboxEvent>,
}

impl CommitSet {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.events.is_empty()
    }
}

/// Identifiers written by a successful commit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    pub entity_ids: Vec<(String, EntityId)>,
    pub event_ids: Vec<OutboxEventId>,
}

/// Result of one delivery attempt, applied when a batch is settled.
#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryOutcome {
    /// Row reached its destination; `status` is PUBLISHED or PROCESSED.
    Delivered {
        id: OutboxEventId,
        status: OutboxStatus,
        at: DateTime<Utc>,
    },
    /// Row could not be delivered; it becomes FAILED with one more retry.
    Failed { id: OutboxEventId, error: String },
}

impl DeliveryOutcome {
    pub fn id(&self) -> OutboxEventId {
        match self {
            Self::Delivered { id, .. } | Self::Failed { id, .. } => *id,
        }
    }
}
