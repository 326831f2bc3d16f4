//! Service wiring for `riskstream run`
//!
//! Builds the market-data, risk and position layers from configuration,
//! reports aggregates on an interval and tears the layers down top first.

use anyhow::{Context, Result};
use common::InstrumentRegistry;
use config::RiskStreamConfig;
use market_data::{InMemoryMarketDataStore, MarketDataService, SimulatedFeed, SimulatedFeedConfig};
use metrics::gauge;
use pricing::PricingContext;
use risk_engine::{AggregateRisk, Holding, PositionService, RiskService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct App {
    market_data: MarketDataService,
    risk: RiskService,
    positions: PositionService,
    report_interval: Duration,
}

impl App {
    /// Wire every layer and subscribe the configured positions.
    ///
    /// Must run inside a tokio runtime; the simulated feed spawns its walks
    /// on the current one.
    pub fn build(config: &RiskStreamConfig) -> Result<Self> {
        let registry = Arc::new(
            InstrumentRegistry::new(config.instruments()?).context("Failed to build instrument registry")?,
        );

        let context = config.pricing.dividend_yields.iter().fold(
            PricingContext::new(config.valuation_date(), config.pricing.risk_free_rate),
            |context, (underlying, q)| context.with_dividend_yield(underlying.as_str(), *q),
        );

        let feed = SimulatedFeed::from_current(feed_config(config))?;
        let store: InMemoryMarketDataStore = config.snapshot().into_iter().collect();
        info!(
            instruments = registry.len(),
            snapshot = store.len(),
            valuation_date = %context.valuation_date,
            "Building services"
        );

        let market_data =
            MarketDataService::new(Arc::clone(&registry), Arc::new(feed)).with_store(Arc::new(store));
        market_data.start().context("Failed to start market data")?;

        let risk = RiskService::new(registry, market_data.clone(), context);
        risk.start().context("Failed to start risk service")?;

        let positions = PositionService::new(risk.clone());
        let app = Self {
            market_data,
            risk,
            positions,
            report_interval: Duration::from_secs(config.service.report_interval_secs.max(1)),
        };

        for position in &config.positions {
            let holding = Holding::new(position.instrument.as_str(), position.size, position.open_price);
            if let Err(e) = app.positions.add_holding(holding) {
                app.shutdown();
                return Err(e).with_context(|| format!("Failed to add position in {}", position.instrument));
            }
        }
        info!(positions = app.positions.len(), "Positions subscribed");

        Ok(app)
    }

    /// Report aggregates until `token` is cancelled
    pub async fn run(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.report_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => self.report(),
            }
        }
    }

    pub fn report(&self) {
        for aggregate in self.positions.aggregates() {
            report_aggregate(&aggregate);
        }
        for snapshot in self.positions.snapshots() {
            if snapshot.risk.is_none() {
                if let Some(condition) = self.risk.condition(&snapshot.holding.instrument) {
                    warn!(instrument = %snapshot.holding.instrument, %condition, "Position unpriced");
                }
            }
        }
    }

    pub fn positions(&self) -> &PositionService {
        &self.positions
    }

    /// Release positions, then risk, then market data
    pub fn shutdown(&self) {
        self.positions.close();
        self.risk.shutdown();
        self.market_data.shutdown();
        info!("All services shut down");
    }
}

fn feed_config(config: &RiskStreamConfig) -> SimulatedFeedConfig {
    SimulatedFeedConfig {
        tick_interval: Duration::from_millis(config.feed.tick_interval_ms),
        step_fraction: config.feed.step_fraction,
        spread_fraction: config.feed.spread_fraction,
        seed_prices: config
            .feed
            .seed_prices
            .iter()
            .map(|(symbol, level)| (symbol.clone(), *level))
            .collect(),
        rng_seed: config.feed.rng_seed,
    }
}

fn report_aggregate(aggregate: &AggregateRisk) {
    let underlying = aggregate.underlying.to_string();
    gauge!("position_delta", "underlying" => underlying.clone()).set(aggregate.delta);
    gauge!("position_gamma", "underlying" => underlying.clone()).set(aggregate.gamma);
    gauge!("position_vega", "underlying" => underlying.clone()).set(aggregate.vega);
    gauge!("position_theta", "underlying" => underlying.clone()).set(aggregate.theta);
    gauge!("position_pnl", "underlying" => underlying).set(aggregate.pnl);

    info!(
        underlying = %aggregate.underlying,
        positions = aggregate.positions,
        unpriced = aggregate.unpriced,
        value = aggregate.theoretical_value,
        delta = aggregate.delta,
        gamma = aggregate.gamma,
        vega = aggregate.vega,
        theta = aggregate.theta,
        rho = aggregate.rho,
        pnl = aggregate.pnl,
        "Aggregate risk"
    );
}
