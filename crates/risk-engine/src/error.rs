//! Risk engine error types

use market_data::MarketDataError;
use pricing::ModelError;
use pubsub::PubSubError;
use thiserror::Error;

/// Errors that can occur during risk and position calculations
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    /// A leg the pricing model needs has never been observed
    #[error("Missing market data for {leg} while pricing {instrument}")]
    MissingMarketData { instrument: String, leg: String },

    /// The pricing model could not value the instrument
    #[error("Cannot value {instrument}: {source}")]
    Model {
        instrument: String,
        #[source]
        source: ModelError,
    },

    /// No risk has been published for the instrument
    #[error("No risk for {0}")]
    NotFound(String),

    /// Instrument is not in the registry
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Invalid position
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Market data layer error
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    /// Pub-sub error
    #[error(transparent)]
    PubSub(#[from] PubSubError),
}

impl RiskError {
    /// Short label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            RiskError::MissingMarketData { .. } => "missing_market_data",
            RiskError::Model { .. } => "model",
            RiskError::NotFound(_) => "not_found",
            RiskError::UnknownInstrument(_) => "unknown_instrument",
            RiskError::InvalidPosition(_) => "invalid_position",
            RiskError::MarketData(_) => "market_data",
            RiskError::PubSub(_) => "pubsub",
        }
    }
}
