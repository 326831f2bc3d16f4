//! Pricing engine for RiskStream
//!
//! Stateless functions turning market data into risk figures.
//!
//! # Core Components
//!
//! - [`black_scholes`] - Black-Scholes-Merton pricing, Greeks, implied volatility
//! - [`risk`] - [`RiskResult`] and [`compute_risk`] over instrument kinds
//! - [`types`] - Model inputs and pricing context
//!
//! # Conventions
//!
//! - Time to expiry is calendar days / 365
//! - Vega and rho are per 1% move, theta is per calendar day
//! - Implied volatility is solved by bisection on [0, 5]

pub mod black_scholes;
pub mod error;
pub mod risk;
pub mod types;

pub use error::ModelError;
pub use risk::{compute_risk, time_to_expiry, RiskResult};
pub use types::{BSInputs, Greeks, MarketBundle, PricingContext};

pub type Result<T> = std::result::Result<T, ModelError>;
