use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use warden_storage::GovernanceCatalog;
use warden_types::Entity;

use super::{ContextField, ContextProvider, FieldType};
use crate::error::GateError;

struct CachedConfig {
    loaded_at: Instant,
    values: Map<String, Value>,
}

/// `config.*`: key-values from the catalog, cached for a fixed TTL.
///
/// When a refresh fails and an older copy exists, the stale copy is served.
pub struct ConfigProvider {
    ttl: Duration,
    cache: RwLock<Option<CachedConfig>>,
}

impl ConfigProvider {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached copy; the next evaluation reloads.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = None;
        }
    }

    fn cached(&self, fresh_only: bool) -> Option<Map<String, Value>> {
        let cache = self.cache.read().ok()?;
        let cached = cache.as_ref()?;
        if fresh_only && cached.loaded_at.elapsed() >= self.ttl {
            return None;
        }
        Some(cached.values.clone())
    }
}

#[async_trait]
impl ContextProvider for ConfigProvider {
    fn namespace(&self) -> &str {
        "config"
    }

    fn schema(&self) -> Vec<ContextField> {
        vec![ContextField::new(
            "*",
            "Configuration",
            FieldType::Object,
            "Any key stored in the configuration table",
        )]
    }

    async fn runtime(
        &self,
        catalog: &dyn GovernanceCatalog,
        _entity: &Entity,
    ) -> Result<Value, GateError> {
        if let Some(values) = self.cached(true) {
            return Ok(Value::Object(values));
        }

        match catalog.config_values().await {
            Ok(values) => {
                debug!(keys = values.len(), "Config cache refreshed");
                if let Ok(mut cache) = self.cache.write() {
                    *cache = Some(CachedConfig {
                        loaded_at: Instant::now(),
                        values: values.clone(),
                    });
                }
                Ok(Value::Object(values))
            }
            Err(e) => match self.cached(false) {
                Some(stale) => {
                    warn!(error = %e, "Config refresh failed; serving stale values");
                    Ok(Value::Object(stale))
                }
                None => Err(GateError::Storage(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use serde_json::json;
    use warden_storage::{StorageError, StorageResult};
    use warden_types::{PolicyBinding, PolicyDefinition, PolicyGroup, WorkflowDefinition};

    #[derive(Default)]
    struct FlakyCatalog {
        failing: AtomicBool,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl GovernanceCatalog for FlakyCatalog {
        async fn active_bindings(&self, _domain: &str) -> StorageResult<Vec<PolicyBinding>> {
            Ok(Vec::new())
        }

        async fn latest_policy(&self, _key: &str) -> StorageResult<Option<PolicyDefinition>> {
            Ok(None)
        }

        async fn policy_group(&self, _key: &str) -> StorageResult<Option<PolicyGroup>> {
            Ok(None)
        }

        async fn active_workflows(&self, _domain: &str) -> StorageResult<Vec<WorkflowDefinition>> {
            Ok(Vec::new())
        }

        async fn config_values(&self) -> StorageResult<Map<String, Value>> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Backend("connection refused".into()));
            }
            let n = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
            let mut map = Map::new();
            map.insert("loads".into(), json!(n));
            Ok(map)
        }
    }

    #[tokio::test]
    async fn caches_within_ttl_and_reloads_after_invalidate() {
        let catalog = FlakyCatalog::default();
        let provider = ConfigProvider::new(Duration::from_secs(60));
        let entity = Entity::new("Order");

        assert_eq!(provider.runtime(&catalog, &entity).await.unwrap()["loads"], 1);
        assert_eq!(provider.runtime(&catalog, &entity).await.unwrap()["loads"], 1);

        provider.invalidate();
        assert_eq!(provider.runtime(&catalog, &entity).await.unwrap()["loads"], 2);
    }

    #[tokio::test]
    async fn serves_stale_values_when_refresh_fails() {
        let catalog = FlakyCatalog::default();
        let provider = ConfigProvider::new(Duration::ZERO);
        let entity = Entity::new("Order");

        assert_eq!(provider.runtime(&catalog, &entity).await.unwrap()["loads"], 1);
        catalog.failing.store(true, Ordering::SeqCst);
        assert_eq!(provider.runtime(&catalog, &entity).await.unwrap()["loads"], 1);

        provider.invalidate();
        assert!(provider.runtime(&catalog, &entity).await.is_err());
    }
}
