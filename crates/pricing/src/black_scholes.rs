use crate::error::ModelError;
use crate::types::{BSInputs, Greeks};
use crate::Result;
use common::OptionType;
use libm::erf;
use std::f64::consts::{PI, SQRT_2};

/// Lower end of the implied volatility search bracket
pub const MIN_VOL: f64 = 0.0;
/// Upper end of the implied volatility search bracket
pub const MAX_VOL: f64 = 5.0;
/// Bisection stops once the bracket is narrower than this
pub const IV_TOLERANCE: f64 = 1e-4;
pub const DAYS_PER_YEAR: f64 = 365.0;

pub fn norm_pdf(x: f64) -> f64 {
    (1.0 / (2.0 * PI).sqrt()) * (-0.5 * x * x).exp()
}

pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

/// d1 and d2 of the Black-Scholes-Merton formula. Inputs must be validated.
pub fn d1_d2(input: &BSInputs) -> (f64, f64) {
    let s = input.spot;
    let k = input.strike;
    let t = input.time;
    let v = input.vol;

    let d1 = ((s / k).ln() + (input.rate - input.dividend + 0.5 * v * v) * t) / (v * t.sqrt());
    let d2 = d1 - v * t.sqrt();

    (d1, d2)
}

pub fn black_scholes_price(input: BSInputs) -> Result<f64> {
    input.validate()?;
    Ok(price_unchecked(&input))
}

fn price_unchecked(input: &BSInputs) -> f64 {
    let (d1, d2) = d1_d2(input);
    let s = input.spot;
    let k = input.strike;
    let t = input.time;
    let df_rate = (-input.rate * t).exp();
    let df_div = (-input.dividend * t).exp();

    match input.option_type {
        OptionType::Call => s * df_div * norm_cdf(d1) - k * df_rate * norm_cdf(d2),
        OptionType::Put => k * df_rate * norm_cdf(-d2) - s * df_div * norm_cdf(-d1),
    }
}

pub fn intrinsic_value(spot: f64, strike: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => (spot - strike).max(0.0),
        OptionType::Put => (strike - spot).max(0.0),
    }
}

/// Value in the zero-volatility limit: discounted forward intrinsic
fn zero_vol_value(input: &BSInputs) -> f64 {
    let forward_spot = input.spot * (-input.dividend * input.time).exp();
    let discounted_strike = input.strike * (-input.rate * input.time).exp();
    intrinsic_value(forward_spot, discounted_strike, input.option_type)
}

/// Analytic Greeks. Vega and rho per 1% move, theta per calendar day.
///
/// Gamma and the diffusion term of theta use the undiscounted spot density
/// `S·φ(d1)`; delta, vega and the carry terms are dividend-discounted.
pub fn black_scholes_greeks(input: BSInputs) -> Result<Greeks> {
    input.validate()?;

    let (d1, d2) = d1_d2(&input);
    let s = input.spot;
    let k = input.strike;
    let t = input.time;
    let v = input.vol;
    let r = input.rate;
    let q = input.dividend;

    let pdf = norm_pdf(d1);
    let sqrt_t = t.sqrt();
    let df_rate = (-r * t).exp();
    let df_div = (-q * t).exp();

    let delta = match input.option_type {
        OptionType::Call => df_div * norm_cdf(d1),
        OptionType::Put => -df_div * norm_cdf(-d1),
    };

    let gamma = pdf / (s * v * sqrt_t);

    let vega = s * df_div * pdf * sqrt_t * 0.01;

    let diffusion = -(s * pdf * v) / (2.0 * sqrt_t);
    let theta = match input.option_type {
        OptionType::Call => {
            diffusion - r * k * df_rate * norm_cdf(d2) + q * s * df_div * norm_cdf(d1)
        }
        OptionType::Put => {
            diffusion + r * k * df_rate * norm_cdf(-d2) - q * s * df_div * norm_cdf(-d1)
        }
    } / DAYS_PER_YEAR;

    let rho = match input.option_type {
        OptionType::Call => k * t * df_rate * norm_cdf(d2),
        OptionType::Put => -k * t * df_rate * norm_cdf(-d2),
    } * 0.01;

    Ok(Greeks {
        delta,
        gamma,
        vega,
        theta,
        rho,
    })
}

/// Solve for the volatility reproducing `market_price`.
///
/// Bisection on `[MIN_VOL, MAX_VOL]`: the closed-form price is evaluated at
/// the midpoint and the bracket shrinks toward the side whose price error has
/// the matching sign, until it is narrower than `IV_TOLERANCE`. The price is
/// increasing in volatility, so at most ~16 halvings are needed.
///
/// The `vol` field of `input` is ignored.
pub fn implied_volatility(market_price: f64, input: BSInputs) -> Result<f64> {
    input.with_vol(MAX_VOL).validate()?;
    if !market_price.is_finite() {
        return Err(ModelError::InvalidInput(format!("premium {}", market_price)));
    }

    let lower = zero_vol_value(&input);
    let upper = price_unchecked(&input.with_vol(MAX_VOL));
    if market_price <= lower || market_price > upper {
        return Err(ModelError::ImpliedVolNotBracketed {
            price: market_price,
            lower,
            upper,
        });
    }

    let mut lo = MIN_VOL;
    let mut hi = MAX_VOL;
    while hi - lo >= IV_TOLERANCE {
        let mid = 0.5 * (lo + hi);
        let error = price_unchecked(&input.with_vol(mid)) - market_price;
        if error > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Ok(0.5 * (lo + hi))
}
