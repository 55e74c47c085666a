use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a matching rule does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    #[default]
    Block,
    Warn,
    SetValue,
    TriggerEvent,
    Transition,
}

/// How verdicts from several policies are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStrategy {
    #[default]
    AllMustPass,
    AtLeastOne,
    PriorityOverride,
    WeightedScore,
}

/// One ordered rule inside a policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub logic: String,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Rule {
    fn new(logic: impl Into<String>, action: RuleAction) -> Self {
        Self {
            logic: logic.into(),
            action,
            message: None,
            target: None,
            value: None,
        }
    }

    pub fn block(logic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(logic, RuleAction::Block).with_message(message)
    }

    pub fn warn(logic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(logic, RuleAction::Warn).with_message(message)
    }

    pub fn set_value(
        logic: impl Into<String>,
        target: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        let mut rule = Self::new(logic, RuleAction::SetValue);
        rule.target = Some(target.into());
        rule.value = Some(value.into());
        rule
    }

    pub fn trigger_event(logic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        let mut rule = Self::new(logic, RuleAction::TriggerEvent);
        rule.value = Some(serde_json::json!({ "event": event.into(), "payload": payload }));
        rule
    }

    pub fn transition(logic: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut rule = Self::new(logic, RuleAction::Transition);
        rule.value = Some(value.into());
        rule
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A versioned, keyed set of rules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, alias = "resolution_strategy")]
    pub resolution: ResolutionStrategy,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PolicyDefinition {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            rules: Vec::new(),
            resolution: ResolutionStrategy::AllMustPass,
            is_active: true,
            version: 0,
            tags: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_resolution(mut self, resolution: ResolutionStrategy) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Named collection of policy keys bound as one unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyGroup {
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub policy_keys: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl PolicyGroup {
    pub fn new(key: impl Into<String>, policy_keys: Vec<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            policy_keys,
            is_active: true,
        }
    }
}

/// What a binding attaches to a domain.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum BindingTarget {
    Policy(String),
    Group(String),
}

/// Attaches a policy or group to a domain at a priority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub target_domain: String,
    pub target: BindingTarget,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl PolicyBinding {
    pub fn policy(domain: impl Into<String>, key: impl Into<String>, priority: i32) -> Self {
        Self {
            target_domain: domain.into(),
            target: BindingTarget::Policy(key.into()),
            priority,
            is_active: true,
        }
    }

    pub fn group(domain: impl Into<String>, key: impl Into<String>, priority: i32) -> Self {
        Self {
            target_domain: domain.into(),
            target: BindingTarget::Group(key.into()),
            priority,
            is_active: true,
        }
    }
}

fn default_true() -> bool {
    true
}
