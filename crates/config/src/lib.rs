use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use common::{DatumKind, Instrument, InstrumentKey, MarketDatum, OptionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root of `riskstream.yaml`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskStreamConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    pub instruments: Vec<InstrumentConfig>,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub positions: Vec<PositionConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Valuation date for every risk computation; today when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valuation_date: Option<NaiveDate>,
    /// Seconds between aggregate risk reports
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            valuation_date: None,
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Continuous dividend yield per underlying key
    #[serde(default)]
    pub dividend_yields: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKindConfig {
    Linear,
    EuropeanOption,
}

/// One instrument definition. Option fields are required for
/// `european_option` and ignored for `linear`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentConfig {
    pub key: String,
    pub kind: InstrumentKindConfig,
    #[serde(default = "default_quote")]
    pub quote: DatumKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_type: Option<OptionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
}

impl InstrumentConfig {
    pub fn linear(key: &str) -> Self {
        Self {
            key: key.to_string(),
            kind: InstrumentKindConfig::Linear,
            quote: DatumKind::Price,
            feed_symbol: None,
            strike: None,
            expiry: None,
            option_type: None,
            underlying: None,
        }
    }

    pub fn european_option(
        key: &str,
        underlying: &str,
        strike: f64,
        expiry: NaiveDate,
        option_type: OptionType,
    ) -> Self {
        Self {
            key: key.to_string(),
            kind: InstrumentKindConfig::EuropeanOption,
            quote: DatumKind::Price,
            feed_symbol: None,
            strike: Some(strike),
            expiry: Some(expiry),
            option_type: Some(option_type),
            underlying: Some(underlying.to_string()),
        }
    }

    /// Build the domain instrument, failing on missing option fields
    pub fn to_instrument(&self) -> anyhow::Result<Instrument> {
        let instrument = match self.kind {
            InstrumentKindConfig::Linear => Instrument::linear(self.key.as_str()),
            InstrumentKindConfig::EuropeanOption => {
                let (Some(strike), Some(expiry), Some(option_type), Some(underlying)) =
                    (self.strike, self.expiry, self.option_type, self.underlying.as_deref())
                else {
                    bail!(
                        "instrument {} needs strike, expiry, option_type and underlying",
                        self.key
                    );
                };
                Instrument::european_option(self.key.as_str(), underlying, strike, expiry, option_type)
            }
        };

        let instrument = instrument.quoted_in(self.quote);
        Ok(match &self.feed_symbol {
            Some(symbol) => instrument.with_feed_symbol(symbol.as_str()),
            None => instrument,
        })
    }
}

/// Simulated feed tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_step_fraction")]
    pub step_fraction: f64,
    #[serde(default = "default_spread_fraction")]
    pub spread_fraction: f64,
    /// Starting level per feed symbol
    #[serde(default)]
    pub seed_prices: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            step_fraction: default_step_fraction(),
            spread_fraction: default_spread_fraction(),
            seed_prices: BTreeMap::new(),
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Last-known values served on cache misses
    #[serde(default)]
    pub snapshot: BTreeMap<String, SnapshotEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SnapshotEntry {
    pub value: f64,
    #[serde(default = "default_quote")]
    pub kind: DatumKind,
}

impl SnapshotEntry {
    pub fn to_datum(&self) -> MarketDatum {
        MarketDatum::two_sided(self.value, self.value, self.kind)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionConfig {
    pub instrument: String,
    pub size: f64,
    #[serde(default)]
    pub open_price: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl RiskStreamConfig {
    /// Configured valuation date, or today (UTC)
    pub fn valuation_date(&self) -> NaiveDate {
        self.service
            .valuation_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Domain instruments in configuration order
    pub fn instruments(&self) -> anyhow::Result<Vec<Instrument>> {
        self.instruments
            .iter()
            .map(|i| {
                i.to_instrument()
                    .with_context(|| format!("Invalid instrument '{}'", i.key))
            })
            .collect()
    }

    /// Store snapshot as domain values
    pub fn snapshot(&self) -> Vec<(InstrumentKey, MarketDatum)> {
        self.store
            .snapshot
            .iter()
            .map(|(key, entry)| (InstrumentKey::from(key.as_str()), entry.to_datum()))
            .collect()
    }
}
