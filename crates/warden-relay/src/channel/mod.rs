//! Delivery channels for relayed outbox rows.
//!
//! A channel receives one [`ChannelMessage`] per row: the topic, the
//! partition key as the message key, and the full row body as JSON. Channels
//! that partition must route equal keys to the same partition so per-key
//! order survives delivery.

mod log;
mod memory;
mod partitioned;
mod webhook;

use std::borrow::Cow;

use async_trait::async_trait;
use serde_json::Value;
use warden_types::{OutboxEvent, OutboxEventId, GLOBAL_PARTITION};

use crate::error::RelayError;

pub use self::log::LogChannel;
pub use memory::InMemoryChannel;
pub use partitioned::PartitionedChannel;
pub use webhook::WebhookChannel;

/// One keyed message bound for a topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelMessage {
    pub topic: String,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub event_id: OutboxEventId,
    pub event_name: String,
}

impl ChannelMessage {
    pub fn from_event(topic: &str, event: &OutboxEvent) -> Result<Self, RelayError> {
        let key = if event.partition_key.is_empty() {
            GLOBAL_PARTITION
        } else {
            event.partition_key.as_str()
        };
        Ok(Self {
            topic: topic.to_string(),
            key: key.as_bytes().to_vec(),
            value: serde_json::to_vec(&event.message_body())?,
            event_id: event.id,
            event_name: event.event_name.clone(),
        })
    }

    pub fn key_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.key)
    }

    pub fn body(&self) -> Result<Value, RelayError> {
        Ok(serde_json::from_slice(&self.value)?)
    }
}

/// A keyed pub/sub destination.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message; `Ok` means the destination accepted it.
    async fn deliver(&self, message: &ChannelMessage) -> Result<(), RelayError>;
}
