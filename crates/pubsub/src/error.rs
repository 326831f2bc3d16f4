//! Pub-sub error types

use thiserror::Error;

/// Errors raised by a [`PubSubService`](crate::PubSubService)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PubSubError {
    /// No value has been published for the key
    #[error("No cached value for key: {0}")]
    NotFound(String),

    /// A listener panicked while being notified
    #[error("Listener {listener} failed on key {key}: {message}")]
    Listener {
        key: String,
        listener: String,
        message: String,
    },

    /// The data source could not open an upstream subscription
    #[error("Upstream subscription for {key} failed: {message}")]
    Upstream { key: String, message: String },

    /// The service has been shut down
    #[error("Service {0} is shut down")]
    ShutDown(String),
}

impl PubSubError {
    /// Create an upstream error
    pub fn upstream(key: impl ToString, message: impl Into<String>) -> Self {
        Self::Upstream {
            key: key.to_string(),
            message: message.into(),
        }
    }
}
