use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::error;
use warden_storage::GovernanceCatalog;
use warden_types::{ContextEnvelope, Entity};

use super::{ActorProvider, ContextField, ContextProvider, SystemProvider};
use crate::error::GateError;

/// Namespaces filled by the interceptor itself.
pub const RESERVED_NAMESPACES: &[&str] = &[
    ContextEnvelope::HOST,
    ContextEnvelope::META,
    ContextEnvelope::CHANGESET,
    ContextEnvelope::SESSION,
];

/// Ordered set of context providers, one per namespace.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `system` and `actor` providers.
    pub fn with_defaults(system: SystemProvider) -> Self {
        Self {
            providers: vec![Arc::new(system), Arc::new(ActorProvider)],
        }
    }

    /// Add a provider, replacing any existing one for the same namespace.
    pub fn register(&mut self, provider: Arc<dyn ContextProvider>) -> Result<(), GateError> {
        let namespace = provider.namespace().to_string();
        if namespace.is_empty() || RESERVED_NAMESPACES.contains(&namespace.as_str()) {
            return Err(GateError::Configuration(format!(
                "context namespace '{namespace}' is reserved"
            )));
        }
        match self
            .providers
            .iter_mut()
            .find(|existing| existing.namespace() == namespace)
        {
            Some(slot) => *slot = provider,
            None => self.providers.push(provider),
        }
        Ok(())
    }

    pub fn namespaces(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.namespace()).collect()
    }

    /// Field documentation for every registered namespace.
    pub fn schema(&self) -> BTreeMap<String, Vec<ContextField>> {
        self.providers
            .iter()
            .map(|p| (p.namespace().to_string(), p.schema()))
            .collect()
    }

    /// Fill every provider namespace into `envelope`.
    ///
    /// A provider that fails contributes an empty namespace; the others are
    /// unaffected.
    pub async fn resolve(
        &self,
        catalog: &dyn GovernanceCatalog,
        entity: &Entity,
        envelope: &mut ContextEnvelope,
    ) {
        for provider in &self.providers {
            let namespace = provider.namespace();
            let values = match provider.runtime(catalog, entity).await {
                Ok(values) => values,
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "Context provider failed");
                    json!({})
                }
            };
            envelope.insert_namespace(namespace, values);
        }
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}
