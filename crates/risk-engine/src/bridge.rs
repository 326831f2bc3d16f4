//! Market-data bridge driving risk recomputation
//!
//! `RiskBridgeSource` is the risk service's data source. Opening an
//! instrument registers one `Bridge` listener on the market-data service
//! for each leg (the instrument itself and, for derivatives, its
//! underlying). Closing removes those registrations again.

use crate::error::RiskError;
use crate::Result;
use common::{InstrumentKey, InstrumentRegistry, MarketDatum};
use market_data::{MarketDataError, MarketDataListener, MarketDataService};
use metrics::counter;
use parking_lot::Mutex;
use pricing::{compute_risk, MarketBundle, PricingContext, RiskResult};
use pubsub::{DataSource, Listener, ListenerHandle, PubSubError, Publisher, Upstream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// State shared by the risk service and its bridges
pub(crate) struct RiskCore {
    registry: Arc<InstrumentRegistry>,
    market_data: MarketDataService,
    context: PricingContext,
    conditions: Mutex<HashMap<InstrumentKey, RiskError>>,
}

impl RiskCore {
    pub(crate) fn new(
        registry: Arc<InstrumentRegistry>,
        market_data: MarketDataService,
        context: PricingContext,
    ) -> Self {
        Self {
            registry,
            market_data,
            context,
            conditions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn context(&self) -> &PricingContext {
        &self.context
    }

    pub(crate) fn market_data(&self) -> &MarketDataService {
        &self.market_data
    }

    /// Price `key` from cached market data. `fresh` overrides the cache for
    /// the leg that just updated.
    pub(crate) fn compute(
        &self,
        key: &InstrumentKey,
        fresh: Option<(&InstrumentKey, &MarketDatum)>,
    ) -> Result<RiskResult> {
        let instrument = self
            .registry
            .get(key)
            .ok_or_else(|| RiskError::UnknownInstrument(key.to_string()))?;

        let own = self.leg(key, key, fresh)?;
        let bundle = match instrument.underlying() {
            Some(underlying) => MarketBundle::derivative(own, self.leg(key, underlying, fresh)?),
            None => MarketBundle::linear(own),
        };

        compute_risk(instrument, &bundle, &self.context).map_err(|source| RiskError::Model {
            instrument: key.to_string(),
            source,
        })
    }

    fn leg(
        &self,
        instrument: &InstrumentKey,
        leg: &InstrumentKey,
        fresh: Option<(&InstrumentKey, &MarketDatum)>,
    ) -> Result<MarketDatum> {
        if let Some((fresh_key, datum)) = fresh {
            if fresh_key == leg {
                return Ok(*datum);
            }
        }
        match self.market_data.get(leg) {
            Ok(datum) => Ok(datum),
            Err(MarketDataError::NotFound(_)) => Err(RiskError::MissingMarketData {
                instrument: instrument.to_string(),
                leg: leg.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Remember why `key` could not be priced. Logs at warn the first time a
    /// given condition appears, at debug while it persists.
    pub(crate) fn record_condition(&self, key: &InstrumentKey, error: RiskError) {
        counter!("risk_recompute_skipped_total", "reason" => error.reason()).increment(1);
        let message = error.to_string();
        let previous = self.conditions.lock().insert(key.clone(), error);
        if previous.map(|p| p.to_string()) == Some(message.clone()) {
            debug!(instrument = %key, condition = %message, "Risk recompute still skipped");
        } else {
            warn!(instrument = %key, condition = %message, "Risk recompute skipped");
        }
    }

    pub(crate) fn clear_condition(&self, key: &InstrumentKey) {
        if self.conditions.lock().remove(key).is_some() {
            debug!(instrument = %key, "Risk condition cleared");
        }
    }

    pub(crate) fn condition(&self, key: &InstrumentKey) -> Option<RiskError> {
        self.conditions.lock().get(key).cloned()
    }

    pub(crate) fn forget(&self, key: &InstrumentKey) {
        self.conditions.lock().remove(key);
    }
}

/// Market-data listener recomputing one instrument's risk
pub(crate) struct Bridge {
    target: InstrumentKey,
    core: Arc<RiskCore>,
    publisher: Publisher<InstrumentKey, RiskResult>,
    /// Set on close. A publish already snapshotted by market data can still
    /// reach a detached bridge and must not touch risk state.
    detached: Arc<AtomicBool>,
}

impl Bridge {
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }
}

impl Listener<InstrumentKey, MarketDatum> for Bridge {
    fn on_update(&self, leg: &InstrumentKey, datum: &MarketDatum) {
        if self.is_detached() {
            return;
        }
        let outcome = self.core.compute(&self.target, Some((leg, datum)));
        if self.is_detached() {
            return;
        }
        match outcome {
            Ok(risk) => {
                self.core.clear_condition(&self.target);
                counter!("risk_published_total").increment(1);
                self.publisher.publish(self.target.clone(), risk);
            }
            Err(e) => self.core.record_condition(&self.target, e),
        }
    }
}

/// Data source of the risk service: one bridge per subscribed instrument
pub(crate) struct RiskBridgeSource {
    core: Arc<RiskCore>,
}

impl RiskBridgeSource {
    pub(crate) fn new(core: Arc<RiskCore>) -> Self {
        Self { core }
    }
}

impl DataSource<InstrumentKey, RiskResult> for RiskBridgeSource {
    fn open(
        &self,
        key: &InstrumentKey,
        publisher: Publisher<InstrumentKey, RiskResult>,
    ) -> pubsub::Result<Box<dyn Upstream>> {
        let instrument = self
            .core
            .registry
            .get(key)
            .ok_or_else(|| PubSubError::upstream(key, "instrument not in registry"))?;

        let mut legs = vec![key.clone()];
        legs.extend(instrument.underlying().cloned());

        let detached = Arc::new(AtomicBool::new(false));
        let bridge: MarketDataListener = Arc::new(Bridge {
            target: key.clone(),
            core: Arc::clone(&self.core),
            publisher,
            detached: Arc::clone(&detached),
        });

        let market_data = self.core.market_data.clone();
        let mut registered: Vec<(InstrumentKey, ListenerHandle)> = Vec::with_capacity(legs.len());
        for leg in legs {
            match market_data.add_listener(leg.clone(), Arc::clone(&bridge)) {
                Ok(handle) => registered.push((leg, handle)),
                Err(e) => {
                    for (leg, handle) in registered {
                        market_data.remove_listener(&leg, handle);
                    }
                    return Err(PubSubError::upstream(key, e.to_string()));
                }
            }
        }
        debug!(instrument = %key, legs = registered.len(), "Risk bridge attached");

        let core = Arc::clone(&self.core);
        let target = key.clone();
        Ok(Box::new(move || {
            detached.store(true, Ordering::Release);
            for (leg, handle) in registered {
                market_data.remove_listener(&leg, handle);
            }
            core.forget(&target);
            debug!(instrument = %target, "Risk bridge detached");
        }))
    }
}
