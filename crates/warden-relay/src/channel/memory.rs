use std::sync::RwLock;

use async_trait::async_trait;

use super::{ChannelMessage, DeliveryChannel};
use crate::error::RelayError;

type RejectFn = Box<dyn Fn(&ChannelMessage) -> bool + Send + Sync>;

/// Keeps accepted messages in delivery order.
///
/// An optional predicate rejects matching messages, which is how tests
/// simulate a partially failing destination.
#[derive(Default)]
pub struct InMemoryChannel {
    delivered: RwLock<Vec<ChannelMessage>>,
    reject: Option<RejectFn>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting<F>(predicate: F) -> Self
    where
        F: Fn(&ChannelMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            delivered: RwLock::new(Vec::new()),
            reject: Some(Box::new(predicate)),
        }
    }

    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.delivered
            .read()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Event ids delivered under `key`, in delivery order.
    pub fn event_ids_for_key(&self, key: &str) -> Vec<i64> {
        self.messages()
            .into_iter()
            .filter(|m| m.key == key.as_bytes())
            .map(|m| m.event_id)
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for InMemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<(), RelayError> {
        if self.reject.as_ref().is_some_and(|reject| reject(message)) {
            return Err(RelayError::delivery(
                self.name(),
                format!("rejected event {}", message.event_id),
            ));
        }
        self.delivered
            .write()
            .map_err(|_| RelayError::delivery(self.name(), "lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}
