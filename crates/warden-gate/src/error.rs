use std::time::Duration;

use thiserror::Error;
use warden_storage::StorageError;
use warden_types::TypesError;
use warden_workflow::WorkflowError;

/// Errors raised by the interception pipeline.
#[derive(Error, Debug)]
pub enum GateError {
    /// At least one bound policy blocked the write.
    #[error("Policy Blocked Save: {}", .0.join("; "))]
    PolicyViolation(Vec<String>),

    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    /// A transition guard was not satisfied.
    #[error("Transition Guard Blocked: {}", .messages.join("; "))]
    GuardRejected {
        workflow: String,
        to: String,
        messages: Vec<String>,
    },

    /// A guard could not be evaluated at all.
    #[error("guard for '{workflow}' could not be evaluated: {reason}")]
    GuardUnavailable { workflow: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("context provider '{namespace}' failed: {reason}")]
    Provider { namespace: String, reason: String },

    #[error("bridge error: {0}")]
    Bridge(String),

    #[error("bridge timed out after {0:?}")]
    BridgeTimeout(Duration),

    #[error("invalid event: {0}")]
    Event(#[from] TypesError),

    #[error("flush hook failed: {0}")]
    Hook(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("entity handle {0} is not staged in this unit of work")]
    UnknownHandle(usize),
}

impl GateError {
    /// Human-readable reasons, one per violated rule where available.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::PolicyViolation(messages) => messages.clone(),
            Self::GuardRejected { messages, .. } => messages.clone(),
            other => vec![other.to_string()],
        }
    }

    /// True for failures that reflect governance decisions rather than
    /// infrastructure trouble.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::PolicyViolation(_)
                | Self::GuardRejected { .. }
                | Self::Workflow(WorkflowError::IllegalTransition { .. })
        )
    }
}

pub type GateResult<T> = Result<T, GateError>;
