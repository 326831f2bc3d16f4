//! Pricing model error types

use common::DatumKind;
use thiserror::Error;

/// Instrument / market data combinations the model cannot value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Expiry is on or before the valuation date
    #[error("Non-positive time to expiry: {0} years")]
    NonPositiveTimeToExpiry(f64),

    /// Supplied volatility is zero, negative or not finite
    #[error("Invalid volatility: {0}")]
    InvalidVolatility(f64),

    /// Spot, strike or price outside the model's domain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Datum kind does not fit the leg it was supplied for
    #[error("Wrong datum kind for {leg}: expected {expected}, got {actual}")]
    WrongDatumKind {
        leg: String,
        expected: DatumKind,
        actual: DatumKind,
    },

    /// Option valued without an underlying quote
    #[error("Missing underlying market data for {0}")]
    MissingUnderlying(String),

    /// Observed premium cannot be produced by any volatility in range
    #[error("Implied volatility not bracketed: premium {price} outside ({lower}, {upper}]")]
    ImpliedVolNotBracketed { price: f64, lower: f64, upper: f64 },
}
