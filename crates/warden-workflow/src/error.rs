//! Workflow error types

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("[Workflow] Path '{from}' -> '{to}' is illegal in '{workflow}'.")]
    IllegalTransition {
        workflow: String,
        from: String,
        to: String,
    },

    #[error("Invalid workflow definition '{workflow}': {message}")]
    InvalidDefinition { workflow: String, message: String },
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
