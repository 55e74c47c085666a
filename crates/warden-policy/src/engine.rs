use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use warden_types::{
    ContextEnvelope, Mutation, PolicyDefinition, ResolutionStrategy, Rule, RuleAction, SideEffect,
    Verdict,
};

use crate::error::{PolicyError, PolicyResult};
use crate::expr::Expression;

/// Prefixes that mark a rule value as a reference into the envelope.
pub const REFERENCE_NAMESPACES: &[&str] = &[
    "host.",
    "meta.",
    "system.",
    "actor.",
    "session.",
    "context.",
    "config.",
    "changeset.",
];

const UNKNOWN_EVENT: &str = "UNKNOWN";

/// Evaluates ordered policy rules against a context envelope.
///
/// Stateless; one engine can be shared across threads.
#[derive(Clone, Debug, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `policies` in order and combine their verdicts.
    ///
    /// Inactive policies are skipped. Warnings, mutations and side effects
    /// from every evaluated policy are kept regardless of the strategy.
    pub fn evaluate(
        &self,
        policies: &[PolicyDefinition],
        context: &ContextEnvelope,
        strategy: ResolutionStrategy,
    ) -> Verdict {
        let started = Instant::now();
        let root = context.to_value();
        let strategy = effective_strategy(strategy);

        let mut combined = Verdict::pass();
        let mut total = 0usize;
        let mut violated = 0usize;

        for policy in policies.iter().filter(|p| p.is_active) {
            total += 1;
            let verdict = self.evaluate_policy(policy, &root);
            if verdict.is_blocked() {
                violated += 1;
            }
            combined.merge(verdict);
        }

        match strategy {
            _ if total == 0 => {
                combined.is_valid = true;
            }
            ResolutionStrategy::AtLeastOne => {
                if total > violated {
                    combined.is_valid = true;
                    combined.blocking_errors.clear();
                } else {
                    combined.is_valid = false;
                }
            }
            _ => {
                combined.is_valid = violated == 0;
            }
        }

        info!(
            policies = total,
            violations = violated,
            strategy = ?strategy,
            valid = combined.is_valid,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Policy evaluation complete"
        );
        combined
    }

    /// Evaluate one policy's rules in declaration order.
    ///
    /// A rule that fails to parse or evaluate is reported as a warning and
    /// the remaining rules still run.
    pub fn evaluate_policy(&self, policy: &PolicyDefinition, context: &Value) -> Verdict {
        let mut verdict = Verdict::pass();
        for (index, rule) in policy.rules.iter().enumerate() {
            if let Err(e) = self.apply_rule(policy, rule, context, &mut verdict) {
                warn!(
                    policy = %policy.key,
                    rule_index = index,
                    error = %e,
                    "Rule crashed; degraded to warning"
                );
                verdict.warn(format!(
                    "System Governance Warning: Rule crashed in '{}'. Logic ignored.",
                    policy.key
                ));
            }
        }
        verdict
    }

    fn apply_rule(
        &self,
        policy: &PolicyDefinition,
        rule: &Rule,
        context: &Value,
        verdict: &mut Verdict,
    ) -> PolicyResult<()> {
        let expression = Expression::parse(&rule.logic)?;
        if !expression.matches(context)? {
            return Ok(());
        }
        debug!(policy = %policy.key, logic = %rule.logic, action = ?rule.action, "Rule matched");

        let message = || {
            rule.message
                .clone()
                .unwrap_or_else(|| format!("Policy '{}' violation.", policy.key))
        };

        match rule.action {
            RuleAction::Block => verdict.block(message()),
            RuleAction::Warn => verdict.warn(message()),
            RuleAction::SetValue => {
                let target = rule.target.clone().ok_or_else(|| missing(rule, "target"))?;
                let value = self.resolve_value(rule.value.as_ref().unwrap_or(&Value::Null), context);
                verdict.mutations.push(Mutation { target, value });
            }
            RuleAction::Transition => {
                let value = self.resolve_value(rule.value.as_ref().unwrap_or(&Value::Null), context);
                verdict.side_effects.push(SideEffect::Transition(value));
            }
            RuleAction::TriggerEvent => {
                let spec = rule
                    .value
                    .as_ref()
                    .and_then(Value::as_object)
                    .ok_or_else(|| missing(rule, "value object"))?;
                let event = spec
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_EVENT)
                    .to_string();
                let payload = match spec.get("payload") {
                    Some(Value::Object(fields)) => Value::Object(self.resolve_fields(fields, context)),
                    Some(other) => other.clone(),
                    None => Value::Object(Map::new()),
                };
                verdict
                    .side_effects
                    .push(SideEffect::TriggerEvent { event, payload });
            }
        }
        Ok(())
    }

    /// Resolve a rule value against the context.
    ///
    /// Strings starting with a reference namespace (`host.`, `actor.`, ...)
    /// are looked up as paths; a path that does not resolve yields `null`.
    /// Anything that fails to parse as a path is returned as written.
    pub fn resolve_value(&self, value: &Value, context: &Value) -> Value {
        let Value::String(text) = value else {
            return value.clone();
        };
        if !REFERENCE_NAMESPACES.iter().any(|ns| text.starts_with(ns)) {
            return value.clone();
        }
        match Expression::parse(text) {
            Ok(expr) if expr.is_path() => expr.evaluate(context).unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        }
    }

    fn resolve_fields(&self, fields: &Map<String, Value>, context: &Value) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve_value(v, context)))
            .collect()
    }
}

fn effective_strategy(strategy: ResolutionStrategy) -> ResolutionStrategy {
    match strategy {
        ResolutionStrategy::PriorityOverride | ResolutionStrategy::WeightedScore => {
            warn!(
                requested = ?strategy,
                "Resolution strategy not implemented distinctly; using ALL_MUST_PASS"
            );
            ResolutionStrategy::AllMustPass
        }
        other => other,
    }
}

fn missing(rule: &Rule, field: &str) -> PolicyError {
    PolicyError::MissingRuleField {
        action: format!("{:?}", rule.action),
        field: field.to_string(),
    }
}
