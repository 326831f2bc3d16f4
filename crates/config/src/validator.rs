use crate::*;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

const LOG_FORMATS: [&str; 3] = ["pretty", "json", "compact"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("No instruments defined")]
    NoInstruments,

    #[error("Instrument key is required")]
    EmptyInstrumentKey,

    #[error("Duplicate instrument key '{0}'")]
    DuplicateInstrument(String),

    #[error("Duplicate feed symbol '{symbol}' on '{key}'")]
    DuplicateFeedSymbol { key: String, symbol: String },

    #[error("Option {key}: {message}")]
    InvalidOption { key: String, message: String },

    #[error("Option {key}: underlying '{underlying}' is not a configured instrument")]
    UnknownUnderlying { key: String, underlying: String },

    #[error("Option {key}: underlying '{underlying}' is itself an option")]
    OptionOnOption { key: String, underlying: String },

    #[error("{field} must be a finite number")]
    InvalidFiniteFloat { field: String },

    #[error("{field} must be a positive float")]
    InvalidPositiveFloat { field: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Position {instrument}: {message}")]
    InvalidPosition { instrument: String, message: String },

    #[error("Snapshot {key}: {message}")]
    InvalidSnapshot { key: String, message: String },

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("metrics.port must be non-zero when metrics are enabled")]
    InvalidMetricsPort,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &RiskStreamConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_service(&config.service, &mut report);
    let kinds = validate_instruments(&config.instruments, &mut report);
    validate_pricing(&config.pricing, &kinds, &mut report);
    validate_feed(&config.feed, &mut report);
    validate_store(&config.store, &kinds, &mut report);
    validate_positions(&config.positions, &kinds, &mut report);
    validate_observability(config, &mut report);

    report
}

fn validate_service(service: &ServiceConfig, report: &mut ValidationReport) {
    if service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }
    if service.valuation_date.is_none() {
        report.add_default("service.valuation_date", "today");
    }
    if service.report_interval_secs == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "service.report_interval_secs".to_string(),
        });
    }
}

/// Checks each instrument and returns the kind of every valid key
fn validate_instruments(
    instruments: &[InstrumentConfig],
    report: &mut ValidationReport,
) -> HashMap<String, InstrumentKindConfig> {
    let mut kinds = HashMap::new();
    if instruments.is_empty() {
        report.add_error(ValidationError::NoInstruments);
        return kinds;
    }

    let mut symbols = HashSet::new();
    for instrument in instruments {
        if instrument.key.trim().is_empty() {
            report.add_error(ValidationError::EmptyInstrumentKey);
            continue;
        }
        if kinds.insert(instrument.key.clone(), instrument.kind).is_some() {
            report.add_error(ValidationError::DuplicateInstrument(instrument.key.clone()));
        }
        let symbol = instrument.feed_symbol.as_deref().unwrap_or(&instrument.key);
        if !symbols.insert(symbol.to_string()) {
            report.add_error(ValidationError::DuplicateFeedSymbol {
                key: instrument.key.clone(),
                symbol: symbol.to_string(),
            });
        }
    }

    for instrument in instruments {
        match instrument.kind {
            InstrumentKindConfig::Linear => {
                if instrument.strike.is_some() || instrument.underlying.is_some() {
                    report.add_warning(
                        &format!("instruments.{}", instrument.key),
                        "option fields are ignored on linear instruments",
                    );
                }
            }
            InstrumentKindConfig::EuropeanOption => validate_option(instrument, &kinds, report),
        }
    }

    kinds
}

fn validate_option(
    option: &InstrumentConfig,
    kinds: &HashMap<String, InstrumentKindConfig>,
    report: &mut ValidationReport,
) {
    let invalid = |message: &str| ValidationError::InvalidOption {
        key: option.key.clone(),
        message: message.to_string(),
    };

    match option.strike {
        None => report.add_error(invalid("strike is required")),
        Some(strike) if !(strike.is_finite() && strike > 0.0) => {
            report.add_error(invalid("strike must be positive"))
        }
        Some(_) => {}
    }
    if option.expiry.is_none() {
        report.add_error(invalid("expiry is required"));
    }
    if option.option_type.is_none() {
        report.add_error(invalid("option_type is required"));
    }

    match option.underlying.as_deref() {
        None => report.add_error(invalid("underlying is required")),
        Some(underlying) => match kinds.get(underlying) {
            None => report.add_error(ValidationError::UnknownUnderlying {
                key: option.key.clone(),
                underlying: underlying.to_string(),
            }),
            Some(InstrumentKindConfig::EuropeanOption) => {
                report.add_error(ValidationError::OptionOnOption {
                    key: option.key.clone(),
                    underlying: underlying.to_string(),
                })
            }
            Some(InstrumentKindConfig::Linear) => {}
        },
    }
}

fn validate_pricing(
    pricing: &PricingConfig,
    kinds: &HashMap<String, InstrumentKindConfig>,
    report: &mut ValidationReport,
) {
    if !pricing.risk_free_rate.is_finite() {
        report.add_error(ValidationError::InvalidFiniteFloat {
            field: "pricing.risk_free_rate".to_string(),
        });
    }
    for (underlying, q) in &pricing.dividend_yields {
        let field = format!("pricing.dividend_yields.{}", underlying);
        if !q.is_finite() {
            report.add_error(ValidationError::InvalidFiniteFloat { field: field.clone() });
        }
        if !kinds.contains_key(underlying) {
            report.add_warning(&field, "not a configured instrument");
        }
    }
}

fn validate_feed(feed: &FeedConfig, report: &mut ValidationReport) {
    if feed.tick_interval_ms == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "feed.tick_interval_ms".to_string(),
        });
    }
    for (field, value) in [
        ("feed.step_fraction", feed.step_fraction),
        ("feed.spread_fraction", feed.spread_fraction),
    ] {
        if !(value.is_finite() && (0.0..1.0).contains(&value)) {
            report.add_error(ValidationError::InvalidFiniteFloat {
                field: field.to_string(),
            });
        }
    }
    for (symbol, level) in &feed.seed_prices {
        if !(level.is_finite() && *level > 0.0) {
            report.add_error(ValidationError::InvalidPositiveFloat {
                field: format!("feed.seed_prices.{}", symbol),
            });
        }
    }
}

fn validate_store(
    store: &StoreConfig,
    kinds: &HashMap<String, InstrumentKindConfig>,
    report: &mut ValidationReport,
) {
    for (key, entry) in &store.snapshot {
        if !entry.value.is_finite() {
            report.add_error(ValidationError::InvalidSnapshot {
                key: key.clone(),
                message: "value must be finite".to_string(),
            });
        }
        if !kinds.contains_key(key) {
            report.add_warning(&format!("store.snapshot.{}", key), "not a configured instrument");
        }
    }
}

fn validate_positions(
    positions: &[PositionConfig],
    kinds: &HashMap<String, InstrumentKindConfig>,
    report: &mut ValidationReport,
) {
    let mut held = HashSet::new();
    for position in positions {
        let invalid = |message: &str| ValidationError::InvalidPosition {
            instrument: position.instrument.clone(),
            message: message.to_string(),
        };
        if !kinds.contains_key(&position.instrument) {
            report.add_error(invalid("unknown instrument"));
        }
        if !position.size.is_finite() || position.size == 0.0 {
            report.add_error(invalid("size must be non-zero"));
        }
        if !position.open_price.is_finite() {
            report.add_error(invalid("open_price must be finite"));
        }
        if !held.insert(position.instrument.as_str()) {
            report.add_error(invalid("instrument held twice"));
        }
    }
}

fn validate_observability(config: &RiskStreamConfig, report: &mut ValidationReport) {
    let format = config.logging.format.to_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(config.logging.format.clone()));
    }
    if config.metrics.enabled && config.metrics.port == 0 {
        report.add_error(ValidationError::InvalidMetricsPort);
    }
}
