use thiserror::Error;

/// Errors raised while constructing or parsing shared types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid event name '{0}': expected DOMAIN:VERB in uppercase")]
    InvalidEventName(String),

    #[error("invalid event version '{0}': expected semantic version X.Y.Z")]
    InvalidEventVersion(String),

    #[error("unknown outbox status '{0}'")]
    UnknownStatus(String),
}

pub type TypesResult<T> = Result<T, TypesError>;
