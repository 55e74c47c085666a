//! Rule expression language.
//!
//! A boolean matching language over a JSON context map:
//!
//! ```text
//! host.status == 'PENDING' && actor.is_superuser == true
//! !(host.total > `1000`) || contains(actor.role, 'finance')
//! meta.tags[0] != null
//! ```
//!
//! Paths that do not resolve evaluate to `null`. `&&` and `||` return one
//! of their operands; a rule matches when its result is truthy.

mod eval;
mod lexer;
mod parser;

use serde_json::Value;

use crate::error::PolicyResult;

pub use eval::is_truthy;
pub use lexer::{Lexer, Token, TokenKind};

/// A parsed expression, reusable across evaluations.
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    source: String,
    root: parser::Node,
}

impl Expression {
    pub fn parse(source: &str) -> PolicyResult<Self> {
        Ok(Self {
            source: source.to_string(),
            root: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the expression is a bare path such as `actor.email`.
    pub fn is_path(&self) -> bool {
        matches!(self.root, parser::Node::Path(_))
    }

    pub fn evaluate(&self, context: &Value) -> PolicyResult<Value> {
        eval::evaluate(&self.root, context)
    }

    /// Evaluate and reduce the result to a match decision.
    pub fn matches(&self, context: &Value) -> PolicyResult<bool> {
        self.evaluate(context).map(|value| is_truthy(&value))
    }
}

/// Parse and match in one step.
pub fn matches(source: &str, context: &Value) -> PolicyResult<bool> {
    Expression::parse(source)?.matches(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use serde_json::json;

    fn context() -> Value {
        json!({
            "host": {"id": 4, "status": "PENDING", "total": 1250.5, "owner": null},
            "meta": {"tags": ["vip", "eu"], "region": "west"},
            "actor": {"is_superuser": false, "role": "finance_clerk", "email": "a@b.com"},
            "changeset": {"status": {"old": "DRAFT", "new": "PENDING"}}
        })
    }

    #[test]
    fn comparisons_over_paths() {
        let ctx = context();
        assert!(matches("host.status == 'PENDING'", &ctx).unwrap());
        assert!(matches("host.total > `1000`", &ctx).unwrap());
        assert!(matches("host.total >= 1250.5", &ctx).unwrap());
        assert!(!matches("host.total < 10", &ctx).unwrap());
        assert!(matches("host.id == 4.0", &ctx).unwrap());
        assert!(matches("changeset.status.old == \"DRAFT\"", &ctx).unwrap());
    }

    #[test]
    fn boolean_operators_and_truthiness() {
        let ctx = context();
        assert!(!matches("actor.is_superuser == true", &ctx).unwrap());
        assert!(matches("!actor.is_superuser", &ctx).unwrap());
        assert!(matches("actor.is_superuser || host.status", &ctx).unwrap());
        assert!(!matches("host.owner", &ctx).unwrap());
        assert!(!matches("host.missing.deeper", &ctx).unwrap());
        assert!(matches("host.missing == null", &ctx).unwrap());
        assert!(matches("(host.total > 1000 && meta.region == 'west') || false", &ctx).unwrap());
    }

    #[test]
    fn index_and_functions() {
        let ctx = context();
        assert!(matches("meta.tags[0] == 'vip'", &ctx).unwrap());
        assert!(matches("meta.tags[-1] == 'eu'", &ctx).unwrap());
        assert!(!matches("meta.tags[5]", &ctx).unwrap());
        assert!(matches("contains(meta.tags, 'eu')", &ctx).unwrap());
        assert!(matches("contains(actor.role, 'finance')", &ctx).unwrap());
        assert!(matches("starts_with(actor.email, 'a@')", &ctx).unwrap());
        assert!(matches("ends_with(actor.email, '.com')", &ctx).unwrap());
        assert!(matches("length(meta.tags) == 2", &ctx).unwrap());
        assert!(matches("not_null(host.owner, actor.email) == 'a@b.com'", &ctx).unwrap());
    }

    #[test]
    fn ordering_across_types_is_falsy() {
        let ctx = context();
        assert!(!matches("host.status > 3", &ctx).unwrap());
        assert!(!matches("host.owner < 3", &ctx).unwrap());
    }

    #[test]
    fn type_errors_surface_as_invalid_argument() {
        let err = matches("length(host.total)", &context()).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidArgument { .. }));
    }

    #[test]
    fn path_detection() {
        assert!(Expression::parse("actor.email").unwrap().is_path());
        assert!(!Expression::parse("actor.email == 'x'").unwrap().is_path());
    }
}
