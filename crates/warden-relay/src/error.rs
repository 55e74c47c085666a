use thiserror::Error;
use warden_storage::StorageError;

/// Errors from outbox delivery and local dispatch.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("delivery failed on channel '{channel}': {message}")]
    Delivery { channel: String, message: String },

    #[error("handler for '{event}' failed: {message}")]
    Handler { event: String, message: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn delivery(channel: &str, message: impl Into<String>) -> Self {
        Self::Delivery {
            channel: channel.to_string(),
            message: message.into(),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
