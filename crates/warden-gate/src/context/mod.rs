//! Runtime context namespaces contributed to the evaluation envelope.
//!
//! Each [`ContextProvider`] owns one namespace (`system`, `actor`, `config`,
//! ...). Providers describe their fields for rule authors via
//! [`ContextProvider::schema`] and produce values per evaluation via
//! [`ContextProvider::runtime`].

mod builtin;
mod config;
mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_storage::GovernanceCatalog;
use warden_types::Entity;

use crate::error::GateError;

pub use builtin::{ActorProvider, SystemProvider};
pub use config::ConfigProvider;
pub use registry::{ContextRegistry, RESERVED_NAMESPACES};

/// Value type advertised for a context field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Datetime,
    Object,
}

/// One documented key within a namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextField {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: String,
}

impl ContextField {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        field_type: FieldType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            field_type,
            description: description.into(),
        }
    }
}

/// A pluggable source for one context namespace.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn namespace(&self) -> &str;

    /// Static description of the keys this provider fills.
    fn schema(&self) -> Vec<ContextField>;

    /// Values for one evaluation of `entity`.
    async fn runtime(
        &self,
        catalog: &dyn GovernanceCatalog,
        entity: &Entity,
    ) -> Result<Value, GateError>;
}
