//! Binding resolution and policy evaluation for one intercepted entity.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use warden_policy::PolicyEngine;
use warden_storage::GovernanceCatalog;
use warden_types::{BindingTarget, ContextEnvelope, Entity, PolicyDefinition, Verdict};

use crate::context::ContextRegistry;
use crate::error::GateError;

/// Loads the policies bound to a domain and evaluates them.
///
/// The catalog handed in here is read through its own connections, separate
/// from the unit of work being flushed.
#[derive(Clone)]
pub struct GovernanceEvaluator {
    catalog: Arc<dyn GovernanceCatalog>,
    registry: ContextRegistry,
    engine: PolicyEngine,
}

impl GovernanceEvaluator {
    pub fn new(catalog: Arc<dyn GovernanceCatalog>, registry: ContextRegistry) -> Self {
        Self {
            catalog,
            registry,
            engine: PolicyEngine::new(),
        }
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Evaluate the domain's bound policies against `snapshot`.
    ///
    /// `envelope` arrives holding the host, meta, changeset and session
    /// namespaces; provider namespaces are added before evaluation, and the
    /// enriched envelope is returned with the verdict.
    pub async fn evaluate(
        &self,
        snapshot: &Entity,
        domain: &str,
        mut envelope: ContextEnvelope,
    ) -> Result<(Verdict, ContextEnvelope), GateError> {
        let started = Instant::now();
        self.registry
            .resolve(self.catalog.as_ref(), snapshot, &mut envelope)
            .await;

        let policies = self.bound_policies(domain).await?;
        if policies.is_empty() {
            debug!(domain = %domain, "No policies bound");
            return Ok((Verdict::pass(), envelope));
        }

        let strategy = policies[0].resolution;
        let verdict = self.engine.evaluate(&policies, &envelope, strategy);
        info!(
            domain = %domain,
            entity_id = ?snapshot.id,
            policies = policies.len(),
            blocked = verdict.is_blocked(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Governance evaluated"
        );
        Ok((verdict, envelope))
    }

    /// Active latest-version policies bound to `domain`, highest binding
    /// priority first, each key at most once.
    pub async fn bound_policies(&self, domain: &str) -> Result<Vec<PolicyDefinition>, GateError> {
        let bindings = self.catalog.active_bindings(domain).await?;
        let mut seen = HashSet::new();
        let mut policies = Vec::new();

        for binding in bindings.iter().filter(|b| b.is_active) {
            let keys = match &binding.target {
                BindingTarget::Policy(key) => vec![key.clone()],
                BindingTarget::Group(key) => match self.catalog.policy_group(key).await? {
                    Some(group) if group.is_active => group.policy_keys,
                    _ => {
                        debug!(group = %key, "Bound group missing or inactive");
                        Vec::new()
                    }
                },
            };

            for key in keys {
                if !seen.insert(key.clone()) {
                    continue;
                }
                match self.catalog.latest_policy(&key).await? {
                    Some(policy) if policy.is_active => policies.push(policy),
                    _ => debug!(policy = %key, "Bound policy missing or inactive"),
                }
            }
        }

        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warden_storage::memory::InMemoryWardenStorage;
    use warden_storage::CatalogAdmin;
    use warden_types::{
        Changeset, PolicyBinding, PolicyGroup, ResolutionStrategy, Rule, SessionInfo,
    };

    use crate::context::SystemProvider;

    fn envelope_for(entity: &Entity) -> ContextEnvelope {
        ContextEnvelope::for_entity(
            entity,
            &Changeset::between(None, entity),
            SessionInfo::interceptor_save(),
        )
    }

    fn evaluator(store: Arc<InMemoryWardenStorage>) -> GovernanceEvaluator {
        GovernanceEvaluator::new(
            store,
            ContextRegistry::with_defaults(SystemProvider::new("test", "0.1.0")),
        )
    }

    #[tokio::test]
    async fn groups_expand_in_priority_order_without_duplicates() {
        let store = Arc::new(InMemoryWardenStorage::new());
        for key in ["a", "b", "c"] {
            store.register_policy(PolicyDefinition::new(key)).await.unwrap();
        }
        store
            .register_group(PolicyGroup::new("bundle", vec!["b".into(), "a".into()]))
            .await
            .unwrap();
        store.bind(PolicyBinding::policy("ORDER", "c", 1)).await.unwrap();
        store.bind(PolicyBinding::group("ORDER", "bundle", 10)).await.unwrap();
        store.bind(PolicyBinding::policy("ORDER", "a", 5)).await.unwrap();

        let keys: Vec<String> = evaluator(store)
            .bound_policies("ORDER")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.key)
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn only_latest_active_version_is_used() {
        let store = Arc::new(InMemoryWardenStorage::new());
        store
            .register_policy(
                PolicyDefinition::new("limits").with_rule(Rule::block("host.total > `10`", "v1")),
            )
            .await
            .unwrap();
        store
            .register_policy(
                PolicyDefinition::new("limits").with_rule(Rule::block("host.total > `100`", "v2")),
            )
            .await
            .unwrap();
        store
            .register_policy(PolicyDefinition::new("retired").inactive())
            .await
            .unwrap();
        store.bind(PolicyBinding::policy("ORDER", "limits", 1)).await.unwrap();
        store.bind(PolicyBinding::policy("ORDER", "retired", 1)).await.unwrap();

        let order = Entity::new("Order").with_id(1).with_field("total", 50);
        let (verdict, envelope) = evaluator(store)
            .evaluate(&order, "ORDER", envelope_for(&order))
            .await
            .unwrap();
        assert!(verdict.is_valid);
        assert_eq!(envelope.namespace("system").unwrap()["environment"], "test");
    }

    #[tokio::test]
    async fn highest_priority_policy_sets_the_strategy() {
        let store = Arc::new(InMemoryWardenStorage::new());
        store
            .register_policy(
                PolicyDefinition::new("lenient")
                    .with_resolution(ResolutionStrategy::AtLeastOne)
                    .with_rule(Rule::block("host.total > `0`", "too big")),
            )
            .await
            .unwrap();
        store.register_policy(PolicyDefinition::new("empty")).await.unwrap();
        store.bind(PolicyBinding::policy("ORDER", "lenient", 9)).await.unwrap();
        store.bind(PolicyBinding::policy("ORDER", "empty", 1)).await.unwrap();

        let order = Entity::new("Order").with_id(1).with_field("total", 5);
        let (verdict, _) = evaluator(store)
            .evaluate(&order, "ORDER", envelope_for(&order))
            .await
            .unwrap();
        assert!(verdict.is_valid);
        assert!(verdict.blocking_errors.is_empty());
    }

    #[tokio::test]
    async fn unbound_domain_passes() {
        let store = Arc::new(InMemoryWardenStorage::new());
        let entity = Entity::new("Note").with_field("text", json!("hi"));
        let (verdict, _) = evaluator(store)
            .evaluate(&entity, "NOTE", envelope_for(&entity))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::pass());
    }
}
