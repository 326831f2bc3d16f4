//! Random-walk feed for demos and soak runs
//!
//! Every subscribed symbol gets its own task on the configured tokio runtime.
//! The task emits a tick per interval until the subscription's cancellation
//! token fires (unsubscribe) or the feed's root token does (shutdown).

use crate::error::MarketDataError;
use crate::feed::{FeedAdapter, FeedCallback, FeedTick};
use crate::Result;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Level used for symbols without a configured seed
pub const DEFAULT_LEVEL: f64 = 100.0;

/// Tuning for [`SimulatedFeed`]
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedFeedConfig {
    /// Time between ticks per symbol
    pub tick_interval: Duration,
    /// Maximum relative move per tick (0.001 = 10bp)
    pub step_fraction: f64,
    /// Bid/offer width relative to the level
    pub spread_fraction: f64,
    /// Starting level per feed symbol
    pub seed_prices: HashMap<String, f64>,
    /// Fixed RNG seed for reproducible walks
    pub rng_seed: Option<u64>,
}

impl Default for SimulatedFeedConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            step_fraction: 0.001,
            spread_fraction: 0.0002,
            seed_prices: HashMap::new(),
            rng_seed: None,
        }
    }
}

/// Feed adapter producing a multiplicative random walk per symbol
pub struct SimulatedFeed {
    handle: Handle,
    config: SimulatedFeedConfig,
    root: CancellationToken,
    tasks: Mutex<HashMap<String, CancellationToken>>,
}

impl SimulatedFeed {
    /// Feed whose walks run on `handle`
    pub fn new(handle: Handle, config: SimulatedFeedConfig) -> Self {
        Self {
            handle,
            config,
            root: CancellationToken::new(),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Feed on the runtime the caller is running in
    pub fn from_current(config: SimulatedFeedConfig) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| MarketDataError::feed(format!("no tokio runtime: {}", e)))?;
        Ok(Self::new(handle, config))
    }

    pub fn active_symbols(&self) -> usize {
        self.tasks.lock().len()
    }

    fn rng_for(&self, symbol: &str) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => {
                let salt = symbol
                    .bytes()
                    .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
                StdRng::seed_from_u64(seed ^ salt)
            }
            None => StdRng::from_entropy(),
        }
    }
}

impl FeedAdapter for SimulatedFeed {
    fn subscribe(&self, symbol: &str, callback: FeedCallback) -> Result<()> {
        if self.root.is_cancelled() {
            return Err(MarketDataError::feed("simulated feed is shut down"));
        }

        let mut tasks = self.tasks.lock();
        if tasks.contains_key(symbol) {
            return Err(MarketDataError::Subscription(format!(
                "{} subscribed twice",
                symbol
            )));
        }

        let token = self.root.child_token();
        let mut rng = self.rng_for(symbol);
        let mut level = self
            .config
            .seed_prices
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_LEVEL);
        let step = self.config.step_fraction;
        let half_spread = self.config.spread_fraction / 2.0;
        let period = self.config.tick_interval;
        let name = symbol.to_string();
        let task_token = token.clone();

        self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = interval.tick() => {
                        level *= 1.0 + step * rng.gen_range(-1.0_f64..=1.0);
                        let tick = FeedTick::new(
                            name.clone(),
                            level * (1.0 - half_spread),
                            level * (1.0 + half_spread),
                        );
                        callback(tick);
                    }
                }
            }
            debug!(symbol = %name, "Simulated walk stopped");
        });

        tasks.insert(symbol.to_string(), token);
        debug!(%symbol, "Simulated feed subscribed");
        Ok(())
    }

    fn unsubscribe(&self, symbol: &str) {
        if let Some(token) = self.tasks.lock().remove(symbol) {
            token.cancel();
            debug!(%symbol, "Simulated feed unsubscribed");
        }
    }

    fn shutdown(&self) {
        self.root.cancel();
        let stopped = self.tasks.lock().drain().count();
        info!(stopped, "Simulated feed shut down");
    }
}
