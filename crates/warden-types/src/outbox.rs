use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::EntityId;
use crate::error::TypesError;

/// Partition key used when an event is not tied to an entity.
pub const GLOBAL_PARTITION: &str = "global";

pub type OutboxEventId = i64;

/// Default partition key: the entity id as a string, else `global`.
pub fn partition_key_for(entity_id: Option<EntityId>) -> String {
    match entity_id {
        Some(id) => id.to_string(),
        None => GLOBAL_PARTITION.to_string(),
    }
}

/// Delivery state of an outbox row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
    Processed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Published => "PUBLISHED",
            Self::Failed => "FAILED",
            Self::Processed => "PROCESSED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PUBLISHED" => Ok(Self::Published),
            "FAILED" => Ok(Self::Failed),
            "PROCESSED" => Ok(Self::Processed),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// Envelope metadata stamped on every outbox payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub trace_id: String,
}

/// `{meta, data}` payload carried by an outbox row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub meta: EventMeta,
    pub data: Value,
}

/// An outbox row that has not been persisted yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    pub event_name: String,
    pub partition_key: String,
    pub trace_id: Option<String>,
    pub payload: EventPayload,
    pub entity_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
}

/// A persisted outbox row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub event_name: String,
    pub partition_key: String,
    pub trace_id: Option<String>,
    pub payload: EventPayload,
    pub entity_id: Option<EntityId>,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub error_log: Option<String>,
}

impl OutboxEvent {
    /// Materialize a staged row as PENDING under the given id.
    pub fn from_new(id: OutboxEventId, event: NewOutboxEvent) -> Self {
        Self {
            id,
            event_name: event.event_name,
            partition_key: event.partition_key,
            trace_id: event.trace_id,
            payload: event.payload,
            entity_id: event.entity_id,
            status: OutboxStatus::Pending,
            created_at: event.created_at,
            processed_at: None,
            retry_count: 0,
            error_log: None,
        }
    }

    /// Text before the first `:` of the event name.
    pub fn domain(&self) -> &str {
        self.event_name
            .split_once(':')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.event_name)
    }

    /// Message body handed to downstream channels.
    pub fn message_body(&self) -> Value {
        json!({
            "id": self.id,
            "event": self.event_name,
            "key": self.partition_key,
            "payload": self.payload,
            "trace_id": self.trace_id,
            "timestamp": self.created_at.to_rfc3339(),
        })
    }
}
