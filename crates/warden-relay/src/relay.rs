//! Outbox relay: PENDING rows to a keyed delivery channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};
use warden_storage::{DeliveryOutcome, OutboxStore};
use warden_types::OutboxStatus;

use crate::channel::{ChannelMessage, DeliveryChannel};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::poller::{BatchProcessor, BatchReport};

/// Publishes PENDING rows, oldest first, and settles each batch at once.
///
/// Delivery is at-least-once: a crash before settlement leaves the batch
/// PENDING and it is sent again. A row that fails delivery becomes FAILED
/// and is not picked up again until requeued.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    channel: Arc<dyn DeliveryChannel>,
    config: RelayConfig,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        channel: Arc<dyn DeliveryChannel>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            channel,
            config,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

#[async_trait]
impl BatchProcessor for OutboxRelay {
    fn name(&self) -> &str {
        "relay"
    }

    async fn process_batch(&self) -> Result<BatchReport, RelayError> {
        let rows = self.store.pending_outbox(self.config.relay_batch_size).await?;
        if rows.is_empty() {
            return Ok(BatchReport::default());
        }

        let topic = self.config.topic();
        let mut report = BatchReport {
            fetched: rows.len(),
            ..BatchReport::default()
        };
        let mut outcomes = Vec::with_capacity(rows.len());

        for row in &rows {
            let sent = match ChannelMessage::from_event(&topic, row) {
                Ok(message) => self.channel.deliver(&message).await,
                Err(e) => Err(e),
            };
            match sent {
                Ok(()) => {
                    debug!(event = %row.event_name, id = row.id, "Event published");
                    report.delivered += 1;
                    outcomes.push(DeliveryOutcome::Delivered {
                        id: row.id,
                        status: OutboxStatus::Published,
                        at: Utc::now(),
                    });
                }
                Err(e) => {
                    error!(event = %row.event_name, id = row.id, error = %e, "Event delivery failed");
                    report.failed += 1;
                    outcomes.push(DeliveryOutcome::Failed {
                        id: row.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.store.settle_outbox(outcomes).await?;
        Ok(report)
    }
}
