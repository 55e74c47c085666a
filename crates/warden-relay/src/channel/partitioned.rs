use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelMessage, DeliveryChannel};
use crate::error::RelayError;

/// Fans messages out to a fixed set of in-process partitions.
///
/// Equal keys always land on the same partition, and each partition is a
/// FIFO queue, so per-key order is preserved for its consumer.
#[derive(Clone, Debug)]
pub struct PartitionedChannel {
    senders: Vec<mpsc::Sender<ChannelMessage>>,
}

impl PartitionedChannel {
    /// Create `partitions` bounded queues and return their receivers.
    pub fn new(partitions: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<ChannelMessage>>) {
        let (senders, receivers) = (0..partitions.max(1))
            .map(|_| mpsc::channel(capacity.max(1)))
            .unzip();
        (Self { senders }, receivers)
    }

    pub fn partitions(&self) -> usize {
        self.senders.len()
    }

    /// Stable FNV-1a routing of a key to a partition index.
    pub fn partition_for(&self, key: &[u8]) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % self.senders.len() as u64) as usize
    }
}

#[async_trait]
impl DeliveryChannel for PartitionedChannel {
    fn name(&self) -> &str {
        "partitioned"
    }

    async fn deliver(&self, message: &ChannelMessage) -> Result<(), RelayError> {
        let partition = self.partition_for(&message.key);
        self.senders[partition]
            .send(message.clone())
            .await
            .map_err(|_| RelayError::delivery(self.name(), format!("partition {partition} closed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(key: &str, id: i64) -> ChannelMessage {
        ChannelMessage {
            topic: "warden.events".into(),
            key: key.as_bytes().to_vec(),
            value: b"{}".to_vec(),
            event_id: id,
            event_name: "ORDER:UPDATED".into(),
        }
    }

    #[tokio::test]
    async fn equal_keys_share_a_partition_in_order() {
        let (channel, mut receivers) = PartitionedChannel::new(4, 16);
        for (id, key) in [(1, "7"), (2, "9"), (3, "7"), (4, "7")] {
            channel.deliver(&message(key, id)).await.unwrap();
        }

        let partition = channel.partition_for(b"7");
        let rx = &mut receivers[partition];
        let mut ids = Vec::new();
        while let Ok(m) = rx.try_recv() {
            if m.key == b"7" {
                ids.push(m.event_id);
            }
        }
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn closed_partition_is_a_delivery_error() {
        let (channel, receivers) = PartitionedChannel::new(1, 1);
        drop(receivers);
        assert!(channel.deliver(&message("1", 1)).await.is_err());
    }
}
