use serde_json::Value;
use tracing::{debug, warn};
use warden_types::{Changeset, Entity, PendingTransition, WorkflowDefinition};

use crate::error::{WorkflowError, WorkflowResult};
use crate::machine::StateMachine;

/// Checks governed-field changes against active workflow definitions.
#[derive(Clone, Debug, Default)]
pub struct WorkflowEnforcer;

impl WorkflowEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Returns one [`PendingTransition`] per legal governed-field change.
    ///
    /// The first illegal change fails the whole call; guards are not
    /// evaluated here.
    pub fn enforce(
        &self,
        entity: &Entity,
        changeset: &Changeset,
        definitions: &[WorkflowDefinition],
    ) -> WorkflowResult<Vec<PendingTransition>> {
        let mut pending = Vec::new();

        for definition in definitions.iter().filter(|d| d.is_active) {
            let field = definition.governed_field.as_str();
            let Some(change) = changeset.get(field) else {
                continue;
            };
            let from = state_of(&change.old);
            let to = state_of(&change.new);
            if from == to {
                continue;
            }

            let machine = StateMachine::new(definition);
            let config = to
                .as_deref()
                .and_then(|to| machine.transition_config(from.as_deref(), to));
            let (Some(to), Some(config)) = (to, config) else {
                let error = WorkflowError::IllegalTransition {
                    workflow: definition.name.clone(),
                    from: from.unwrap_or_else(|| "(none)".to_string()),
                    to: state_label(&change.new),
                };
                warn!(
                    entity_id = ?entity.id,
                    domain = %entity.domain_key(),
                    error = %error,
                    "Workflow transition rejected"
                );
                return Err(error);
            };

            debug!(
                workflow = %definition.name,
                from = ?from,
                to = %to,
                guarded = config.guard.is_some(),
                "Workflow transition pending"
            );
            pending.push(PendingTransition {
                workflow: definition.name.clone(),
                scope: definition.scope.clone(),
                field: field.to_string(),
                from,
                to,
                guard: config.guard,
                actions: config.actions,
            });
        }

        Ok(pending)
    }
}

fn state_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn state_label(value: &Value) -> String {
    state_of(value).unwrap_or_else(|| "(none)".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::{ActionList, TransitionSpec};

    fn workflow() -> WorkflowDefinition {
        WorkflowDefinition::new("account_lifecycle", "ACCOUNT", "PENDING")
            .with_transition(
                "PENDING",
                "ACTIVATE",
                TransitionSpec::Expanded {
                    target: "ACTIVE".into(),
                    guard: Some("actor.is_superuser == true".into()),
                    actions: Some(ActionList::One("send_email".into())),
                },
            )
            .with_state("ACTIVE")
    }

    fn moved(from: &str, to: &str) -> (Entity, Changeset) {
        let original = Entity::new("Account").with_id(1).with_field("status", from);
        let mut current = original.clone();
        current.set_field("status", to);
        let changes = Changeset::between(Some(&original), &current);
        (current, changes)
    }

    #[test]
    fn legal_change_yields_pending_transition() {
        let (entity, changes) = moved("PENDING", "ACTIVE");
        let pending = WorkflowEnforcer::new()
            .enforce(&entity, &changes, &[workflow()])
            .unwrap();
        assert_eq!(pending.len(), 1);
        let transition = &pending[0];
        assert_eq!(transition.from.as_deref(), Some("PENDING"));
        assert_eq!(transition.to, "ACTIVE");
        assert_eq!(transition.scope, "LIFECYCLE");
        assert_eq!(transition.guard.as_deref(), Some("actor.is_superuser == true"));
        assert_eq!(transition.actions, vec!["send_email"]);
    }

    #[test]
    fn illegal_change_fails_with_path_message() {
        let (entity, changes) = moved("ACTIVE", "PENDING");
        let err = WorkflowEnforcer::new()
            .enforce(&entity, &changes, &[workflow()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "[Workflow] Path 'ACTIVE' -> 'PENDING' is illegal in 'account_lifecycle'."
        );
    }

    #[test]
    fn new_entity_must_start_in_initial_state() {
        let fresh = Entity::new("Account").with_field("status", "PENDING");
        let changes = Changeset::between(None, &fresh);
        let pending = WorkflowEnforcer::new()
            .enforce(&fresh, &changes, &[workflow()])
            .unwrap();
        assert_eq!(pending[0].from, None);

        let skipping = Entity::new("Account").with_field("status", "ACTIVE");
        let changes = Changeset::between(None, &skipping);
        assert!(WorkflowEnforcer::new()
            .enforce(&skipping, &changes, &[workflow()])
            .is_err());
    }

    #[test]
    fn untouched_field_and_inactive_definitions_are_ignored() {
        let original = Entity::new("Account").with_id(1).with_field("status", "PENDING").with_field("name", "a");
        let mut current = original.clone();
        current.set_field("name", "b");
        let changes = Changeset::between(Some(&original), &current);
        assert!(WorkflowEnforcer::new()
            .enforce(&current, &changes, &[workflow()])
            .unwrap()
            .is_empty());

        let (entity, changes) = moved("ACTIVE", "PENDING");
        let mut inactive = workflow();
        inactive.is_active = false;
        assert!(WorkflowEnforcer::new()
            .enforce(&entity, &changes, &[inactive])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn custom_governed_field() {
        let definition = WorkflowDefinition::new("stage_flow", "ACCOUNT", "LEAD")
            .with_governed_field("stage")
            .with_scope("SALES")
            .with_transition("LEAD", "QUALIFY", TransitionSpec::Target("QUALIFIED".into()))
            .with_state("QUALIFIED");
        let original = Entity::new("Account").with_id(2).with_field("stage", "LEAD");
        let mut current = original.clone();
        current.set_field("stage", "QUALIFIED");
        let changes = Changeset::between(Some(&original), &current);

        let pending = WorkflowEnforcer::new()
            .enforce(&current, &changes, &[definition])
            .unwrap();
        assert_eq!(pending[0].field, "stage");
        assert_eq!(pending[0].scope, "SALES");
    }
}
