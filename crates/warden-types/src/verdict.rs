use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A field assignment requested by a SET_VALUE rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub target: String,
    pub value: Value,
}

/// Deferred effect requested by a rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SideEffect {
    TriggerEvent { event: String, payload: Value },
    Transition(Value),
}

/// Structured result of policy evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_valid: bool,
    #[serde(default)]
    pub blocking_errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default)]
    pub side_effects: Vec<SideEffect>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self::pass()
    }
}

impl Verdict {
    pub fn pass() -> Self {
        Self {
            is_valid: true,
            blocking_errors: Vec::new(),
            warnings: Vec::new(),
            mutations: Vec::new(),
            side_effects: Vec::new(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        !self.is_valid
    }

    /// Record a violation; the verdict becomes invalid.
    pub fn block(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.blocking_errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another verdict into this one, keeping order.
    pub fn merge(&mut self, other: Verdict) {
        self.is_valid = self.is_valid && other.is_valid;
        self.blocking_errors.extend(other.blocking_errors);
        self.warnings.extend(other.warnings);
        self.mutations.extend(other.mutations);
        self.side_effects.extend(other.side_effects);
    }
}
