//! Policy evaluation error types

/// Errors raised while parsing or evaluating rule expressions.
///
/// The engine never lets one of these escape a policy: a failing rule is
/// reported as a warning on that rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("Parse error at column {col}: {message}")]
    Parse { col: usize, message: String },

    #[error("Unexpected token at column {col}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        col: usize,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of expression: expected {0}")]
    UnexpectedEof(String),

    #[error("Unknown function: '{0}'")]
    UnknownFunction(String),

    #[error("Function '{function}' expects {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("Invalid argument to '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Rule action {action} requires a {field}")]
    MissingRuleField { action: String, field: String },
}

pub type PolicyResult<T> = Result<T, PolicyError>;
