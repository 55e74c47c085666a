//! Warden outbox delivery.
//!
//! Two consumers drain the PENDING outbox set on a fixed interval:
//! - [`OutboxRelay`] hands each row to a keyed [`DeliveryChannel`] and marks
//!   it PUBLISHED
//! - [`OutboxWorker`] runs a local [`EventHandler`] chosen by event-name
//!   prefix and marks the row PROCESSED
//!
//! Either way a row that cannot be delivered becomes FAILED with its error
//! recorded, and the rest of the batch continues.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod config;
pub mod error;
pub mod poller;
pub mod relay;
pub mod worker;

pub use channel::{
    ChannelMessage, DeliveryChannel, InMemoryChannel, LogChannel, PartitionedChannel,
    WebhookChannel,
};
pub use config::{ChannelConfig, DaemonConfig, LoggingConfig, RelayConfig, StorageConfig};
pub use error::{RelayError, RelayResult};
pub use poller::{run_poller, BatchProcessor, BatchReport};
pub use relay::OutboxRelay;
pub use worker::{
    AcknowledgeHandler, AuditLogHandler, EventHandler, HandlerRegistry, OutboxWorker,
    WorkflowActionHandler,
};
