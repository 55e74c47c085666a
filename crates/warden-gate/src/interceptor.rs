//! The pre-commit governance hook.
//!
//! For each new or changed entity in a flush, in order:
//! 1. evaluate bound policies (through the bridge) and abort on BLOCK
//! 2. apply SET_VALUE mutations and buffer rule side effects
//! 3. check governed-field changes against active workflows
//! 4. verify transition guards and schedule their actions
//! 5. append the change-data-capture row
//!
//! Outbox rows are only buffered here; the unit of work persists them with
//! the entities or not at all.

use std::sync::Arc;

use tracing::{debug, warn};
use warden_storage::GovernanceCatalog;
use warden_types::{
    CallerIdentity, ContextEnvelope, Entity, Mutation, NewOutboxEvent, SessionInfo, SideEffect,
    WorkflowDefinition,
};
use warden_workflow::WorkflowEnforcer;

use crate::bridge::AsyncBridge;
use crate::error::GateError;
use crate::failure::{FailurePolicies, FailureSite};
use crate::governance::GovernanceEvaluator;
use crate::handshake::TransitionHandshake;
use crate::outbox::OutboxWriter;
use crate::unit_of_work::{FlushContext, FlushHook, StagedEntity};

const META_PREFIX: &str = "meta.";

/// Governs every entity write before it reaches storage.
pub struct MutationInterceptor {
    bridge: AsyncBridge,
    evaluator: Arc<GovernanceEvaluator>,
    catalog: Arc<dyn GovernanceCatalog>,
    enforcer: WorkflowEnforcer,
    handshake: TransitionHandshake,
    writer: OutboxWriter,
    failures: FailurePolicies,
}

impl MutationInterceptor {
    pub fn new(
        bridge: AsyncBridge,
        evaluator: Arc<GovernanceEvaluator>,
        catalog: Arc<dyn GovernanceCatalog>,
        writer: OutboxWriter,
        failures: FailurePolicies,
    ) -> Self {
        Self {
            bridge,
            evaluator,
            catalog,
            enforcer: WorkflowEnforcer::new(),
            handshake: TransitionHandshake::new(writer.clone()),
            writer,
            failures,
        }
    }

    fn intercept(
        &self,
        staged: &mut StagedEntity,
        identity: &CallerIdentity,
        events: &mut Vec<NewOutboxEvent>,
    ) -> Result<(), GateError> {
        let changes = staged.changeset();
        if changes.is_empty() && !staged.is_new() {
            return Ok(());
        }

        let domain = staged.entity().domain_key();
        let snapshot = staged.entity().clone();
        let partial =
            ContextEnvelope::for_entity(&snapshot, &changes, SessionInfo::interceptor_save());

        let evaluator = self.evaluator.clone();
        let evaluated = {
            let domain = domain.clone();
            let partial = partial.clone();
            self.bridge.run(identity, move || async move {
                evaluator.evaluate(&snapshot, &domain, partial).await
            })
        };

        let envelope = match evaluated {
            Ok((verdict, envelope)) => {
                if verdict.is_blocked() {
                    warn!(
                        domain = %domain,
                        entity_id = ?staged.entity().id,
                        errors = ?verdict.blocking_errors,
                        "Policy blocked save"
                    );
                    return Err(GateError::PolicyViolation(verdict.blocking_errors));
                }
                for warning in &verdict.warnings {
                    warn!(
                        domain = %domain,
                        entity_id = ?staged.entity().id,
                        warning = %warning,
                        "Policy warning"
                    );
                }
                for mutation in &verdict.mutations {
                    apply_mutation(staged.entity_mut(), mutation);
                }
                let trace = trace_id(&envelope, identity);
                for effect in verdict.side_effects {
                    let row =
                        self.side_effect_row(effect, &domain, staged.entity(), trace.as_deref());
                    events.push(row);
                }
                envelope
            }
            Err(e) => {
                self.failures
                    .handle(FailureSite::GovernanceInfrastructure, e)?;
                partial
            }
        };
        let trace = trace_id(&envelope, identity);

        // Mutations may have touched the governed field.
        let changes = staged.changeset();
        let definitions = self.workflows(&domain, identity)?;
        let pending = self
            .enforcer
            .enforce(staged.entity(), &changes, &definitions)?;

        for transition in &pending {
            match self.handshake.verify(transition, &envelope) {
                Ok(()) => {}
                // Only a rejection stops the edge's actions.
                Err(e @ GateError::GuardUnavailable { .. }) => {
                    self.failures.handle(FailureSite::GuardInfrastructure, e)?;
                }
                Err(e) => return Err(e),
            }
            events.extend(self.handshake.schedule_actions(
                transition,
                staged.entity(),
                trace.as_deref(),
            ));
        }

        events.push(self.writer.change_captured(
            staged.entity(),
            &domain,
            staged.is_new(),
            &changes,
            trace.as_deref(),
        ));
        Ok(())
    }

    fn workflows(
        &self,
        domain: &str,
        identity: &CallerIdentity,
    ) -> Result<Vec<WorkflowDefinition>, GateError> {
        let catalog = self.catalog.clone();
        let domain_key = domain.to_string();
        let loaded = self.bridge.run(identity, move || async move {
            catalog
                .active_workflows(&domain_key)
                .await
                .map_err(GateError::from)
        });
        match loaded {
            Ok(definitions) => Ok(definitions),
            Err(e) => {
                self.failures.handle(FailureSite::WorkflowInfrastructure, e)?;
                Ok(Vec::new())
            }
        }
    }

    fn side_effect_row(
        &self,
        effect: SideEffect,
        domain: &str,
        entity: &Entity,
        trace: Option<&str>,
    ) -> NewOutboxEvent {
        match effect {
            SideEffect::TriggerEvent { event, payload } => {
                self.writer.triggered(&event, payload, entity, trace)
            }
            SideEffect::Transition(target) => {
                self.writer.transition_requested(domain, target, entity, trace)
            }
        }
    }
}

impl FlushHook for MutationInterceptor {
    fn name(&self) -> &str {
        "mutation_interceptor"
    }

    fn before_flush(&self, flush: &mut FlushContext) -> Result<(), GateError> {
        let identity = flush.identity().clone();
        let mut events = Vec::new();
        for staged in flush.entries_mut() {
            self.intercept(staged, &identity, &mut events)?;
        }
        flush.append_events(events);
        Ok(())
    }
}

/// `meta.<key>` targets land in the attribute container; other targets are
/// applied only when the entity already has that field.
fn apply_mutation(entity: &mut Entity, mutation: &Mutation) {
    if let Some(key) = mutation.target.strip_prefix(META_PREFIX) {
        entity.set_attribute(key, mutation.value.clone());
    } else if entity.has_field(&mutation.target) {
        entity.set_field(mutation.target.clone(), mutation.value.clone());
    } else {
        debug!(field = %mutation.target, "Mutation target is not a field; skipped");
    }
}

fn trace_id(envelope: &ContextEnvelope, identity: &CallerIdentity) -> Option<String> {
    envelope
        .request_id()
        .map(str::to_string)
        .or_else(|| identity.trace_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn mutations_target_fields_or_attributes() {
        let mut entity = Entity::new("Order").with_field("priority", "low");

        apply_mutation(
            &mut entity,
            &Mutation {
                target: "priority".into(),
                value: json!("high"),
            },
        );
        apply_mutation(
            &mut entity,
            &Mutation {
                target: "meta.flagged".into(),
                value: Value::Bool(true),
            },
        );
        apply_mutation(
            &mut entity,
            &Mutation {
                target: "nonexistent".into(),
                value: json!(1),
            },
        );

        assert_eq!(entity.field("priority"), Some(&json!("high")));
        assert_eq!(entity.attribute("flagged"), Some(&json!(true)));
        assert!(!entity.has_field("nonexistent"));
    }

    #[test]
    fn trace_prefers_request_id() {
        let identity = CallerIdentity::anonymous().with_trace_id("caller");
        let mut envelope = ContextEnvelope::default();
        assert_eq!(trace_id(&envelope, &identity).as_deref(), Some("caller"));
        envelope.insert_namespace("system", json!({"request_id": "req-1"}));
        assert_eq!(trace_id(&envelope, &identity).as_deref(), Some("req-1"));
    }
}
