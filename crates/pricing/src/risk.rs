//! Risk figures per instrument kind

use crate::black_scholes::{black_scholes_greeks, black_scholes_price, implied_volatility, DAYS_PER_YEAR};
use crate::error::ModelError;
use crate::types::{BSInputs, Greeks, MarketBundle, PricingContext};
use crate::Result;
use chrono::NaiveDate;
use common::{DatumKind, Instrument, InstrumentKind, MarketDatum};
use serde::{Deserialize, Serialize};

/// Value and sensitivities of one unit of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskResult {
    pub theoretical_value: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
    pub implied_volatility: f64,
}

impl RiskResult {
    /// Identity risk of a linear instrument: its price, delta one
    pub fn linear(price: f64) -> Self {
        Self {
            theoretical_value: price,
            delta: 1.0,
            ..Self::default()
        }
    }

    pub fn from_greeks(theoretical_value: f64, greeks: Greeks, implied_volatility: f64) -> Self {
        Self {
            theoretical_value,
            delta: greeks.delta,
            gamma: greeks.gamma,
            vega: greeks.vega,
            theta: greeks.theta,
            rho: greeks.rho,
            implied_volatility,
        }
    }

    /// Scale to a position of `multiplier` units. Implied volatility does not scale.
    pub fn multiply(&self, multiplier: f64) -> Self {
        Self {
            theoretical_value: self.theoretical_value * multiplier,
            delta: self.delta * multiplier,
            gamma: self.gamma * multiplier,
            vega: self.vega * multiplier,
            theta: self.theta * multiplier,
            rho: self.rho * multiplier,
            implied_volatility: self.implied_volatility,
        }
    }

    pub fn greeks(&self) -> Greeks {
        Greeks {
            delta: self.delta,
            gamma: self.gamma,
            vega: self.vega,
            theta: self.theta,
            rho: self.rho,
        }
    }
}

/// Year fraction between valuation and expiry, calendar days / 365
pub fn time_to_expiry(valuation_date: NaiveDate, expiry: NaiveDate) -> f64 {
    (expiry - valuation_date).num_days() as f64 / DAYS_PER_YEAR
}

fn expect_kind(leg: &Instrument, datum: &MarketDatum, expected: DatumKind) -> Result<()> {
    if datum.kind() == expected {
        Ok(())
    } else {
        Err(ModelError::WrongDatumKind {
            leg: leg.key.to_string(),
            expected,
            actual: datum.kind(),
        })
    }
}

/// Value `instrument` from `bundle` as of `context.valuation_date`.
///
/// Options quoted in volatility are priced from it; options quoted in price
/// have their volatility implied from the premium first.
pub fn compute_risk(instrument: &Instrument, bundle: &MarketBundle, context: &PricingContext) -> Result<RiskResult> {
    match &instrument.kind {
        InstrumentKind::Linear => {
            expect_kind(instrument, &bundle.own, DatumKind::Price)?;
            Ok(RiskResult::linear(bundle.own.value()))
        }
        InstrumentKind::EuropeanOption {
            strike,
            expiry,
            option_type,
            underlying,
        } => {
            let spot = bundle
                .underlying
                .ok_or_else(|| ModelError::MissingUnderlying(instrument.key.to_string()))?;
            if spot.kind() != DatumKind::Price {
                return Err(ModelError::WrongDatumKind {
                    leg: underlying.to_string(),
                    expected: DatumKind::Price,
                    actual: spot.kind(),
                });
            }

            let time = time_to_expiry(context.valuation_date, *expiry);
            if time <= 0.0 {
                return Err(ModelError::NonPositiveTimeToExpiry(time));
            }

            let inputs = BSInputs {
                spot: spot.value(),
                strike: *strike,
                time,
                vol: 0.0,
                rate: context.risk_free_rate,
                dividend: context.dividend_yield(underlying),
                option_type: *option_type,
            };

            let vol = match bundle.own.kind() {
                DatumKind::Volatility => bundle.own.value(),
                DatumKind::Price => implied_volatility(bundle.own.value(), inputs)?,
            };
            let inputs = inputs.with_vol(vol);

            let value = black_scholes_price(inputs)?;
            let greeks = black_scholes_greeks(inputs)?;
            Ok(RiskResult::from_greeks(value, greeks, vol))
        }
    }
}
