//! Position layer types

use chrono::{DateTime, Utc};
use common::InstrumentKey;
use pricing::RiskResult;
use serde::{Deserialize, Serialize};

/// A sized holding in one instrument. Positive size is long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub instrument: InstrumentKey,
    pub size: f64,
    pub open_price: f64,
}

impl Holding {
    pub fn new(instrument: impl Into<InstrumentKey>, size: f64, open_price: f64) -> Self {
        Self {
            instrument: instrument.into(),
            size,
            open_price,
        }
    }

    pub fn is_long(&self) -> bool {
        self.size > 0.0
    }
}

/// Current state of one holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub holding: Holding,
    /// Grouping key: the underlying for derivatives, the instrument itself otherwise
    pub underlying: InstrumentKey,
    /// Risk of one unit as last published
    pub unit_risk: Option<RiskResult>,
    /// Unit risk scaled by the holding size
    pub risk: Option<RiskResult>,
    /// Price the holding is marked at
    pub mark: Option<f64>,
    /// `(mark - open_price) * size`
    pub pnl: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl PositionSnapshot {
    pub(crate) fn new(holding: Holding, underlying: InstrumentKey) -> Self {
        Self {
            holding,
            underlying,
            unit_risk: None,
            risk: None,
            mark: None,
            pnl: None,
            updated_at: Utc::now(),
        }
    }

    pub(crate) fn apply_risk(&mut self, unit: RiskResult) {
        self.unit_risk = Some(unit);
        self.risk = Some(unit.multiply(self.holding.size));
        self.updated_at = Utc::now();
    }

    pub(crate) fn apply_mark(&mut self, mark: f64) {
        self.mark = Some(mark);
        self.pnl = Some((mark - self.holding.open_price) * self.holding.size);
        self.updated_at = Utc::now();
    }
}

/// Scaled risk and P&L summed over the holdings on one underlying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRisk {
    pub underlying: InstrumentKey,
    pub positions: usize,
    /// Holdings without published risk yet
    pub unpriced: usize,
    pub theoretical_value: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub rho: f64,
    pub pnl: f64,
}

impl AggregateRisk {
    pub fn new(underlying: InstrumentKey) -> Self {
        Self {
            underlying,
            positions: 0,
            unpriced: 0,
            theoretical_value: 0.0,
            delta: 0.0,
            gamma: 0.0,
            vega: 0.0,
            theta: 0.0,
            rho: 0.0,
            pnl: 0.0,
        }
    }

    pub(crate) fn add(&mut self, snapshot: &PositionSnapshot) {
        self.positions += 1;
        match &snapshot.risk {
            Some(risk) => {
                self.theoretical_value += risk.theoretical_value;
                self.delta += risk.delta;
                self.gamma += risk.gamma;
                self.vega += risk.vega;
                self.theta += risk.theta;
                self.rho += risk.rho;
            }
            None => self.unpriced += 1,
        }
        self.pnl += snapshot.pnl.unwrap_or(0.0);
    }
}
