use async_trait::async_trait;
use tracing::info;

use super::{ChannelMessage, DeliveryChannel};
use crate::error::RelayError;

/// Writes each message to the log and accepts it.
#[derive(Clone, Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<(), RelayError> {
        info!(
            topic = %message.topic,
            key = %message.key_str(),
            event = %message.event_name,
            event_id = message.event_id,
            bytes = message.value.len(),
            "Event relayed"
        );
        Ok(())
    }
}
