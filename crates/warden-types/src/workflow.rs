use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_GOVERNED_FIELD: &str = "status";
pub const DEFAULT_SCOPE: &str = "LIFECYCLE";

/// Actions attached to an edge: a single name or a list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionList {
    One(String),
    Many(Vec<String>),
}

impl ActionList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(action) => vec![action.clone()],
            Self::Many(actions) => actions.clone(),
        }
    }
}

/// Outgoing edge of a state, in either the bare or expanded encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransitionSpec {
    Target(String),
    Expanded {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        actions: Option<ActionList>,
    },
}

impl TransitionSpec {
    pub fn target(&self) -> &str {
        match self {
            Self::Target(target) => target,
            Self::Expanded { target, .. } => target,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNode {
    #[serde(default)]
    pub on: BTreeMap<String, TransitionSpec>,
}

/// Lifecycle graph for one field of one domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub domain: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_governed_field")]
    pub governed_field: String,
    pub initial: String,
    #[serde(default)]
    pub states: BTreeMap<String, StateNode>,
    #[serde(default)]
    pub version: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl WorkflowDefinition {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        initial: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            scope: default_scope(),
            governed_field: default_governed_field(),
            initial: initial.into(),
            states: BTreeMap::new(),
            version: 0,
            is_active: true,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_governed_field(mut self, field: impl Into<String>) -> Self {
        self.governed_field = field.into();
        self
    }

    /// Declare a state with no outgoing edges (idempotent).
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.states.entry(state.into()).or_default();
        self
    }

    /// Add an edge `from --event--> spec`, declaring `from` if needed.
    pub fn with_transition(
        mut self,
        from: impl Into<String>,
        event: impl Into<String>,
        spec: TransitionSpec,
    ) -> Self {
        self.states
            .entry(from.into())
            .or_default()
            .on
            .insert(event.into(), spec);
        self
    }
}

/// A legal governed-field change awaiting its guard handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub workflow: String,
    pub scope: String,
    pub field: String,
    pub from: Option<String>,
    pub to: String,
    pub guard: Option<String>,
    pub actions: Vec<String>,
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_governed_field() -> String {
    DEFAULT_GOVERNED_FIELD.to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn both_edge_encodings_deserialize() {
        let definition: WorkflowDefinition = serde_json::from_value(json!({
            "name": "order_lifecycle",
            "domain": "ORDER",
            "initial": "DRAFT",
            "states": {
                "DRAFT": {"on": {"SUBMIT": "PENDING"}},
                "PENDING": {"on": {"APPROVE": {
                    "target": "ACTIVE",
                    "guard": "actor.is_superuser == `true`",
                    "actions": "notify_slack"
                }}},
                "ACTIVE": {}
            }
        }))
        .unwrap();

        assert_eq!(definition.governed_field, "status");
        assert_eq!(definition.scope, "LIFECYCLE");
        assert_eq!(definition.states["DRAFT"].on["SUBMIT"].target(), "PENDING");
        match &definition.states["PENDING"].on["APPROVE"] {
            TransitionSpec::Expanded { guard, actions, .. } => {
                assert!(guard.is_some());
                assert_eq!(actions.as_ref().unwrap().to_vec(), vec!["notify_slack"]);
            }
            other => panic!("expected expanded edge, got {other:?}"),
        }
    }
}
