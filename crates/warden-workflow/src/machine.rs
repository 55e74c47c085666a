use std::collections::BTreeMap;

use warden_types::{TransitionSpec, WorkflowDefinition};

use crate::error::{WorkflowError, WorkflowResult};

/// Normalized outgoing edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionConfig {
    /// Event that fires the edge; `None` for entry into the initial state.
    pub event: Option<String>,
    pub target: String,
    pub guard: Option<String>,
    pub actions: Vec<String>,
}

/// Transition-legality oracle built from a workflow definition.
///
/// Pure: construction and every query are side-effect free.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMachine {
    name: String,
    initial: String,
    graph: BTreeMap<String, Vec<TransitionConfig>>,
}

impl StateMachine {
    /// Build the lookup table; both edge encodings become [`TransitionConfig`].
    pub fn new(definition: &WorkflowDefinition) -> Self {
        let graph = definition
            .states
            .iter()
            .map(|(state, node)| {
                let edges = node
                    .on
                    .iter()
                    .map(|(event, spec)| normalize(event, spec))
                    .collect();
                (state.clone(), edges)
            })
            .collect();

        Self {
            name: definition.name.clone(),
            initial: definition.initial.clone(),
            graph,
        }
    }

    /// Build and check that the initial state and every edge target are declared.
    pub fn validated(definition: &WorkflowDefinition) -> WorkflowResult<Self> {
        let machine = Self::new(definition);
        let invalid = |message: String| WorkflowError::InvalidDefinition {
            workflow: definition.name.clone(),
            message,
        };

        if !machine.graph.contains_key(&machine.initial) {
            return Err(invalid(format!(
                "initial state '{}' is not declared",
                machine.initial
            )));
        }
        for (state, edges) in &machine.graph {
            for edge in edges {
                if !machine.graph.contains_key(&edge.target) {
                    return Err(invalid(format!(
                        "edge '{}' from '{}' targets undeclared state '{}'",
                        edge.event.as_deref().unwrap_or_default(),
                        state,
                        edge.target
                    )));
                }
            }
        }
        Ok(machine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> &str {
        &self.initial
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.graph.keys().map(String::as_str)
    }

    /// Edge leading from `from` to `to`, if the move is legal.
    ///
    /// An empty `from` (new entity, unset field) is legal only when `to` is
    /// the initial state. There are no implicit self-loops or wildcards.
    pub fn transition_config(&self, from: Option<&str>, to: &str) -> Option<TransitionConfig> {
        match from {
            None | Some("") => (to == self.initial).then(|| TransitionConfig {
                event: None,
                target: self.initial.clone(),
                guard: None,
                actions: Vec::new(),
            }),
            Some(from) => self
                .graph
                .get(from)?
                .iter()
                .find(|edge| edge.target == to)
                .cloned(),
        }
    }

    /// Actions declared on the legal `from -> to` edge.
    pub fn actions_for(&self, from: Option<&str>, to: &str) -> Vec<String> {
        self.transition_config(from, to)
            .map(|config| config.actions)
            .unwrap_or_default()
    }

    /// Outgoing edges of `state`.
    pub fn state_node(&self, state: &str) -> Option<&[TransitionConfig]> {
        self.graph.get(state).map(Vec::as_slice)
    }

    pub fn events_from(&self, state: &str) -> Vec<&str> {
        self.state_node(state)
            .map(|edges| edges.iter().filter_map(|e| e.event.as_deref()).collect())
            .unwrap_or_default()
    }

    pub fn transition_for_event(&self, from: &str, event: &str) -> Option<&TransitionConfig> {
        self.state_node(from)?
            .iter()
            .find(|edge| edge.event.as_deref() == Some(event))
    }
}

fn normalize(event: &str, spec: &TransitionSpec) -> TransitionConfig {
    match spec {
        TransitionSpec::Target(target) => TransitionConfig {
            event: Some(event.to_string()),
            target: target.clone(),
            guard: None,
            actions: Vec::new(),
        },
        TransitionSpec::Expanded {
            target,
            guard,
            actions,
        } => TransitionConfig {
            event: Some(event.to_string()),
            target: target.clone(),
            guard: guard.clone().filter(|g| !g.trim().is_empty()),
            actions: actions.as_ref().map(|a| a.to_vec()).unwrap_or_default(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use warden_types::ActionList;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("account_lifecycle", "ACCOUNT", "PENDING")
            .with_transition(
                "PENDING",
                "ACTIVATE",
                TransitionSpec::Expanded {
                    target: "ACTIVE".into(),
                    guard: Some("actor.is_superuser == true".into()),
                    actions: Some(ActionList::Many(vec!["send_email".into(), "notify_slack".into()])),
                },
            )
            .with_transition("PENDING", "REJECT", TransitionSpec::Target("CLOSED".into()))
            .with_transition(
                "ACTIVE",
                "CLOSE",
                TransitionSpec::Expanded {
                    target: "CLOSED".into(),
                    guard: None,
                    actions: Some(ActionList::One("archive".into())),
                },
            )
            .with_state("CLOSED")
    }

    #[test]
    fn legal_edges_resolve_with_guard_and_actions() {
        let machine = StateMachine::new(&definition());
        let config = machine.transition_config(Some("PENDING"), "ACTIVE").unwrap();
        assert_eq!(config.event.as_deref(), Some("ACTIVATE"));
        assert_eq!(config.guard.as_deref(), Some("actor.is_superuser == true"));
        assert_eq!(config.actions, vec!["send_email", "notify_slack"]);

        let bare = machine.transition_config(Some("PENDING"), "CLOSED").unwrap();
        assert_eq!(bare.guard, None);
        assert!(bare.actions.is_empty());
        assert_eq!(machine.actions_for(Some("ACTIVE"), "CLOSED"), vec!["archive"]);
    }

    #[test]
    fn illegal_edges_and_self_loops_are_rejected() {
        let machine = StateMachine::new(&definition());
        assert!(machine.transition_config(Some("CLOSED"), "ACTIVE").is_none());
        assert!(machine.transition_config(Some("ACTIVE"), "ACTIVE").is_none());
        assert!(machine.transition_config(Some("UNKNOWN"), "ACTIVE").is_none());
    }

    #[test]
    fn empty_origin_only_enters_initial_state() {
        let machine = StateMachine::new(&definition());
        assert!(machine.transition_config(None, "PENDING").is_some());
        assert!(machine.transition_config(Some(""), "PENDING").is_some());
        assert!(machine.transition_config(None, "ACTIVE").is_none());
    }

    #[test]
    fn side_queries() {
        let machine = StateMachine::new(&definition());
        assert_eq!(machine.events_from("PENDING"), vec!["ACTIVATE", "REJECT"]);
        assert_eq!(
            machine.transition_for_event("PENDING", "REJECT").map(|e| e.target.as_str()),
            Some("CLOSED")
        );
        assert_eq!(machine.state_node("CLOSED").map(|e| e.len()), Some(0));
        assert_eq!(machine.initial_state(), "PENDING");
    }

    #[test]
    fn validation_catches_dangling_targets() {
        assert!(StateMachine::validated(&definition()).is_ok());

        let dangling = WorkflowDefinition::new("broken", "ACCOUNT", "PENDING")
            .with_transition("PENDING", "GO", TransitionSpec::Target("NOWHERE".into()));
        assert!(matches!(
            StateMachine::validated(&dangling),
            Err(WorkflowError::InvalidDefinition { .. })
        ));

        let no_initial = WorkflowDefinition::new("broken", "ACCOUNT", "START").with_state("OTHER");
        assert!(StateMachine::validated(&no_initial).is_err());
    }

    proptest! {
        #[test]
        fn transition_config_is_idempotent(
            from in prop::option::of(prop::sample::select(vec!["", "PENDING", "ACTIVE", "CLOSED", "GHOST"])),
            to in prop::sample::select(vec!["PENDING", "ACTIVE", "CLOSED", "GHOST"]),
        ) {
            let machine = StateMachine::new(&definition());
            let first = machine.transition_config(from, to);
            let second = machine.transition_config(from, to);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first, StateMachine::new(&definition()).transition_config(from, to));
        }
    }
}
