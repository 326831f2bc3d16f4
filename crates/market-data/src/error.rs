//! Market data error types

use pubsub::PubSubError;
use thiserror::Error;

/// Errors that can occur during market data operations
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    /// Nothing cached or stored for the instrument
    #[error("No market data for {0}")]
    NotFound(String),

    /// Instrument is not in the registry
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Feed adapter refused or failed a request
    #[error("Feed error: {0}")]
    Feed(String),

    /// Subscription error
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Backing store lookup failed
    #[error("Store error: {0}")]
    Store(String),

    /// Error from the underlying pub-sub service
    #[error(transparent)]
    PubSub(#[from] PubSubError),
}

impl MarketDataError {
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }
}
