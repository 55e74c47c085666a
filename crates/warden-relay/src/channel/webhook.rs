use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::{ChannelMessage, DeliveryChannel};
use crate::error::RelayError;

/// POSTs each message body to an HTTP endpoint.
///
/// The partition key travels in `X-Partition-Key` and the topic in
/// `X-Event-Topic`. Any non-2xx response is a delivery failure.
#[derive(Clone, Debug)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<(), RelayError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Partition-Key", message.key.as_slice())
            .header("X-Event-Topic", message.topic.as_str())
            .body(message.value.clone())
            .send()
            .await
            .map_err(|e| RelayError::delivery(self.name(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::delivery(
                self.name(),
                format!("endpoint returned {status}"),
            ));
        }
        debug!(event_id = message.event_id, status = %status, "Webhook accepted event");
        Ok(())
    }
}
