//! Warden storage abstractions.
//!
//! Three contracts cover everything the pipeline persists:
//! - [`EntityStore`]: business records, committed atomically with the
//!   outbox rows that describe them
//! - [`OutboxStore`]: the durable event queue drained by relays and workers
//! - [`GovernanceCatalog`] / [`CatalogAdmin`]: policies, groups, bindings,
//!   workflow definitions and config values
//!
//! [`memory::InMemoryWardenStorage`] is the deterministic reference adapter.
//! The `sqlite` feature adds a transactional sqlx-backed adapter.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod traits;

pub use error::{StorageError, StorageResult};
pub use model::{CommitReceipt, CommitSet, DeliveryOutcome};
pub use traits::{
    CatalogAdmin, EntityStore, GovernanceCatalog, OutboxStore, QueryWindow, WardenStorage,
};
