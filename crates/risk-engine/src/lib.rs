//! Risk and Position Layers for RiskStream
//!
//! The risk layer is a keyed pub-sub service over [`RiskResult`]s whose
//! upstream is internal: the first risk listener on an instrument registers a
//! bridge listener on the market-data layer for every leg the instrument
//! needs, and each market-data update recomputes and republishes the risk.
//! The last risk listener leaving removes the bridge again, so an unused
//! instrument costs nothing at either layer.
//!
//! The position layer holds sized holdings on top of both layers and keeps
//! scaled risk and mark-to-market P&L per holding.
//!
//! # Key Invariants
//!
//! - Risk is never published before every required leg has been observed
//! - Pricing failures are logged and recorded per instrument, never raised
//!   into the market-data publisher
//! - Lock order is risk, then market data; market data never calls into the
//!   risk layer while holding its lock

mod bridge;
pub mod error;
pub mod position;
pub mod service;
pub mod types;

pub use error::RiskError;
pub use position::PositionService;
pub use pricing::RiskResult;
pub use service::{RiskListener, RiskService};
pub use types::{AggregateRisk, Holding, PositionSnapshot};

/// Result type for risk operations
pub type Result<T> = std::result::Result<T, RiskError>;
