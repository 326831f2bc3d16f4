//! Common types used across RiskStream
//!
//! This module provides the fundamental domain types: instrument keys,
//! market data values and instrument definitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a tradable instrument.
///
/// Keys address cache entries, listener lists and upstream subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentKey(String);

impl InstrumentKey {
    /// Create a key from any string-like value
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for InstrumentKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Unique identifier for a listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Create a new random SubscriptionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Option type (Call or Put)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Returns true for calls
    pub fn is_call(&self) -> bool {
        matches!(self, OptionType::Call)
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// What a market datum quotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatumKind {
    /// A price in the instrument's currency
    Price,
    /// An annualised volatility as a decimal (0.10 = 10%)
    Volatility,
}

impl std::fmt::Display for DatumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatumKind::Price => write!(f, "price"),
            DatumKind::Volatility => write!(f, "volatility"),
        }
    }
}

/// A single observation of market data.
///
/// Immutable once built; a newer datum supersedes an older one in the cache.
/// Single-valued quotes carry `bid == offer`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketDatum {
    bid: f64,
    offer: f64,
    kind: DatumKind,
    timestamp: DateTime<Utc>,
}

impl MarketDatum {
    /// Two-sided quote observed now
    pub fn two_sided(bid: f64, offer: f64, kind: DatumKind) -> Self {
        Self {
            bid,
            offer,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Single price observed now
    pub fn price(value: f64) -> Self {
        Self::two_sided(value, value, DatumKind::Price)
    }

    /// Single volatility observed now
    pub fn volatility(value: f64) -> Self {
        Self::two_sided(value, value, DatumKind::Volatility)
    }

    /// Replace the observation time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mid of bid and offer
    pub fn value(&self) -> f64 {
        0.5 * (self.bid + self.offer)
    }

    pub fn bid(&self) -> f64 {
        self.bid
    }

    pub fn offer(&self) -> f64 {
        self.offer
    }

    pub fn kind(&self) -> DatumKind {
        self.kind
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True when bid and offer differ
    pub fn is_two_sided(&self) -> bool {
        self.bid != self.offer
    }
}

/// Instrument families the pricing engine understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentKind {
    /// Priced directly from its own quote (stock, future, index)
    Linear,
    /// European option on another instrument
    EuropeanOption {
        strike: f64,
        expiry: NaiveDate,
        option_type: OptionType,
        underlying: InstrumentKey,
    },
}

/// Static definition of a tradable instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub key: InstrumentKey,
    #[serde(flatten)]
    pub kind: InstrumentKind,
    /// What the feed quotes for this instrument
    pub quote: DatumKind,
    /// Address on the feed, when it differs from the key
    #[serde(default)]
    pub feed_symbol: Option<String>,
}

impl Instrument {
    /// Linear instrument quoted in price
    pub fn linear(key: impl Into<InstrumentKey>) -> Self {
        Self {
            key: key.into(),
            kind: InstrumentKind::Linear,
            quote: DatumKind::Price,
            feed_symbol: None,
        }
    }

    /// European option, quoted in price unless changed with [`Instrument::quoted_in`]
    pub fn european_option(
        key: impl Into<InstrumentKey>,
        underlying: impl Into<InstrumentKey>,
        strike: f64,
        expiry: NaiveDate,
        option_type: OptionType,
    ) -> Self {
        Self {
            key: key.into(),
            kind: InstrumentKind::EuropeanOption {
                strike,
                expiry,
                option_type,
                underlying: underlying.into(),
            },
            quote: DatumKind::Price,
            feed_symbol: None,
        }
    }

    pub fn quoted_in(mut self, quote: DatumKind) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_feed_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.feed_symbol = Some(symbol.into());
        self
    }

    /// Symbol used to address this instrument on the feed
    pub fn feed_symbol(&self) -> &str {
        self.feed_symbol.as_deref().unwrap_or(self.key.as_str())
    }

    /// Underlying leg for derivatives
    pub fn underlying(&self) -> Option<&InstrumentKey> {
        match &self.kind {
            InstrumentKind::Linear => None,
            InstrumentKind::EuropeanOption { underlying, .. } => Some(underlying),
        }
    }

    pub fn is_derivative(&self) -> bool {
        self.underlying().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datum_mid_and_sides() {
        let datum = MarketDatum::two_sided(99.0, 101.0, DatumKind::Price);
        assert_eq!(datum.value(), 100.0);
        assert!(datum.is_two_sided());
        assert!(!MarketDatum::price(100.0).is_two_sided());
    }

    #[test]
    fn test_feed_symbol_defaults_to_key() {
        let spx = Instrument::linear("SPX");
        assert_eq!(spx.feed_symbol(), "SPX");

        let mapped = Instrument::linear("SPX").with_feed_symbol(".SPX");
        assert_eq!(mapped.feed_symbol(), ".SPX");
    }

    #[test]
    fn test_option_underlying() {
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        let option = Instrument::european_option("SPX-C", "SPX", 5000.0, expiry, OptionType::Call);
        assert_eq!(option.underlying(), Some(&InstrumentKey::from("SPX")));
        assert!(option.is_derivative());
        assert!(!Instrument::linear("SPX").is_derivative());
    }

    #[test]
    fn test_instrument_serde_shape() {
        let expiry = NaiveDate::from_ymd_opt(2025, 3, 21).unwrap();
        let option = Instrument::european_option("SPX-P", "SPX", 5000.0, expiry, OptionType::Put)
            .quoted_in(DatumKind::Volatility);

        let json = serde_json::to_value(&option).unwrap();
        assert_eq!(json["kind"], "european_option");
        assert_eq!(json["option_type"], "put");
        assert_eq!(json["quote"], "volatility");

        let back: Instrument = serde_json::from_value(json).unwrap();
        assert_eq!(back, option);
    }
}
