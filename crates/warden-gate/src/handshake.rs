//! Guard verification for legal transitions.
//!
//! A guard expression names the condition under which a transition is
//! permitted. The handshake evaluates it as a one-rule policy that blocks
//! when the guard is not satisfied, against the same enriched envelope the
//! governance step used.

use tracing::{info, warn};
use warden_policy::{Expression, PolicyEngine};
use warden_types::{ContextEnvelope, Entity, NewOutboxEvent, PendingTransition, PolicyDefinition, Rule};

use crate::error::GateError;
use crate::outbox::OutboxWriter;

/// Key of the ad-hoc policy built for each guard.
pub const GUARD_POLICY_KEY: &str = "transition_guard";

/// Verifies guards and schedules transition actions.
#[derive(Clone, Debug)]
pub struct TransitionHandshake {
    engine: PolicyEngine,
    writer: OutboxWriter,
}

impl TransitionHandshake {
    pub fn new(writer: OutboxWriter) -> Self {
        Self {
            engine: PolicyEngine::new(),
            writer,
        }
    }

    /// One-rule policy that blocks when `guard` is not satisfied.
    pub fn guard_policy(guard: &str) -> PolicyDefinition {
        PolicyDefinition::new(GUARD_POLICY_KEY).with_rule(Rule::block(
            format!("!({guard})"),
            format!("State Guard Failed: {guard}"),
        ))
    }

    /// Check the transition's guard.
    ///
    /// A guard that does not parse is reported as
    /// [`GateError::GuardUnavailable`] so the caller can apply its
    /// infrastructure policy; an unsatisfied guard is
    /// [`GateError::GuardRejected`].
    pub fn verify(
        &self,
        transition: &PendingTransition,
        envelope: &ContextEnvelope,
    ) -> Result<(), GateError> {
        let Some(guard) = transition.guard.as_deref() else {
            return Ok(());
        };

        if let Err(e) = Expression::parse(guard) {
            return Err(GateError::GuardUnavailable {
                workflow: transition.workflow.clone(),
                reason: e.to_string(),
            });
        }

        let policy = Self::guard_policy(guard);
        let verdict = self.engine.evaluate_policy(&policy, &envelope.to_value());
        if verdict.is_blocked() {
            warn!(
                workflow = %transition.workflow,
                from = ?transition.from,
                to = %transition.to,
                guard = %guard,
                "Transition guard rejected"
            );
            return Err(GateError::GuardRejected {
                workflow: transition.workflow.clone(),
                to: transition.to.clone(),
                messages: verdict.blocking_errors,
            });
        }
        Ok(())
    }

    /// Outbox rows for the transition's declared actions, in declaration order.
    pub fn schedule_actions(
        &self,
        transition: &PendingTransition,
        entity: &Entity,
        trace_id: Option<&str>,
    ) -> Vec<NewOutboxEvent> {
        if !transition.actions.is_empty() {
            info!(
                workflow = %transition.workflow,
                to = %transition.to,
                actions = transition.actions.len(),
                "Scheduling transition actions"
            );
        }
        transition
            .actions
            .iter()
            .map(|action| self.writer.workflow_action(action, transition, entity, trace_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activation(guard: Option<&str>) -> PendingTransition {
        PendingTransition {
            workflow: "account_lifecycle".into(),
            scope: "LIFECYCLE".into(),
            field: "status".into(),
            from: Some("PENDING".into()),
            to: "ACTIVE".into(),
            guard: guard.map(str::to_string),
            actions: vec!["send_email".into(), "notify_slack".into()],
        }
    }

    fn envelope(is_superuser: bool) -> ContextEnvelope {
        let mut envelope = ContextEnvelope::default();
        envelope.insert_namespace("actor", json!({"is_superuser": is_superuser}));
        envelope
    }

    #[test]
    fn satisfied_guard_permits() {
        let handshake = TransitionHandshake::new(OutboxWriter::new("test"));
        let transition = activation(Some("actor.is_superuser == `true`"));
        assert!(handshake.verify(&transition, &envelope(true)).is_ok());
    }

    #[test]
    fn unsatisfied_guard_rejects_with_message() {
        let handshake = TransitionHandshake::new(OutboxWriter::new("test"));
        let transition = activation(Some("actor.is_superuser == `true`"));
        let err = handshake.verify(&transition, &envelope(false)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transition Guard Blocked: State Guard Failed: actor.is_superuser == `true`"
        );
        assert!(err.is_rejection());
    }

    #[test]
    fn unguarded_and_unparseable_guards() {
        let handshake = TransitionHandshake::new(OutboxWriter::new("test"));
        assert!(handshake.verify(&activation(None), &envelope(false)).is_ok());

        let err = handshake
            .verify(&activation(Some("actor.is_superuser ==")), &envelope(true))
            .unwrap_err();
        assert!(matches!(err, GateError::GuardUnavailable { .. }));
    }

    #[test]
    fn actions_become_rows_in_order() {
        let handshake = TransitionHandshake::new(OutboxWriter::new("test"));
        let account = Entity::new("Account").with_id(8);
        let rows = handshake.schedule_actions(&activation(None), &account, Some("req-1"));
        let names: Vec<_> = rows.iter().map(|r| r.event_name.as_str()).collect();
        assert_eq!(names, vec!["WORKFLOW:SEND_EMAIL", "WORKFLOW:NOTIFY_SLACK"]);
        assert!(rows.iter().all(|r| r.partition_key == "8"));
    }
}
