//! Shared types for the pricing engine

use crate::error::ModelError;
use chrono::NaiveDate;
use common::{InstrumentKey, MarketDatum, OptionType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Inputs for Black-Scholes-Merton pricing
#[derive(Debug, Clone, Copy)]
pub struct BSInputs {
    /// Spot price of the underlying
    pub spot: f64,
    /// Strike price
    pub strike: f64,
    /// Time to expiry (in years)
    pub time: f64,
    /// Volatility (as decimal, e.g., 0.10 = 10%)
    pub vol: f64,
    /// Continuously compounded risk-free rate
    pub rate: f64,
    /// Continuous dividend yield
    pub dividend: f64,
    /// Option type
    pub option_type: OptionType,
}

impl BSInputs {
    /// Reject inputs the closed form is undefined for
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.time.is_nan() || self.time <= 0.0 {
            return Err(ModelError::NonPositiveTimeToExpiry(self.time));
        }
        if !is_positive(self.vol) {
            return Err(ModelError::InvalidVolatility(self.vol));
        }
        if !is_positive(self.spot) {
            return Err(ModelError::InvalidInput(format!("spot {}", self.spot)));
        }
        if !is_positive(self.strike) {
            return Err(ModelError::InvalidInput(format!("strike {}", self.strike)));
        }
        if !self.rate.is_finite() || !self.dividend.is_finite() {
            return Err(ModelError::InvalidInput(format!(
                "rate {} / dividend {}",
                self.rate, self.dividend
            )));
        }
        Ok(())
    }

    /// Same inputs at another volatility
    pub fn with_vol(self, vol: f64) -> Self {
        Self { vol, ..self }
    }
}

fn is_positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// Option Greeks in trading units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// ∂V/∂S
    pub delta: f64,
    /// ∂²V/∂S²
    pub gamma: f64,
    /// ∂V/∂σ per 1 vol point
    pub vega: f64,
    /// ∂V/∂t per calendar day
    pub theta: f64,
    /// ∂V/∂r per 1% rate move
    pub rho: f64,
}

/// Market data needed to value one instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketBundle {
    /// Quote for the instrument itself (price or volatility)
    pub own: MarketDatum,
    /// Underlying price, required for derivatives
    pub underlying: Option<MarketDatum>,
}

impl MarketBundle {
    pub fn linear(own: MarketDatum) -> Self {
        Self {
            own,
            underlying: None,
        }
    }

    pub fn derivative(own: MarketDatum, underlying: MarketDatum) -> Self {
        Self {
            own,
            underlying: Some(underlying),
        }
    }
}

/// Fixed parameters shared by every valuation
#[derive(Debug, Clone, PartialEq)]
pub struct PricingContext {
    pub valuation_date: NaiveDate,
    pub risk_free_rate: f64,
    /// Dividend yield per underlying; absent means zero
    pub dividend_yields: HashMap<InstrumentKey, f64>,
}

impl PricingContext {
    pub fn new(valuation_date: NaiveDate, risk_free_rate: f64) -> Self {
        Self {
            valuation_date,
            risk_free_rate,
            dividend_yields: HashMap::new(),
        }
    }

    pub fn with_dividend_yield(mut self, underlying: impl Into<InstrumentKey>, yield_: f64) -> Self {
        self.dividend_yields.insert(underlying.into(), yield_);
        self
    }

    pub fn dividend_yield(&self, underlying: &InstrumentKey) -> f64 {
        self.dividend_yields.get(underlying).copied().unwrap_or(0.0)
    }
}
