//! The risk service

use crate::bridge::{RiskBridgeSource, RiskCore};
use crate::error::RiskError;
use crate::Result;
use common::{InstrumentKey, InstrumentRegistry};
use market_data::MarketDataService;
use pricing::{PricingContext, RiskResult};
use pubsub::{Listener, ListenerHandle, PubSubError, PubSubService};
use std::sync::Arc;
use tracing::debug;

/// Service name used in logs and metric labels
pub const SERVICE_NAME: &str = "risk";

/// Listener on risk updates
pub type RiskListener = Arc<dyn Listener<InstrumentKey, RiskResult>>;

/// Live unit risk per instrument, recomputed from the market-data service.
///
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct RiskService {
    inner: PubSubService<InstrumentKey, RiskResult>,
    core: Arc<RiskCore>,
    registry: Arc<InstrumentRegistry>,
}

impl RiskService {
    pub fn new(
        registry: Arc<InstrumentRegistry>,
        market_data: MarketDataService,
        context: PricingContext,
    ) -> Self {
        let core = Arc::new(RiskCore::new(Arc::clone(&registry), market_data, context));
        let source = Arc::new(RiskBridgeSource::new(Arc::clone(&core)));
        Self {
            inner: PubSubService::new(SERVICE_NAME, source),
            core,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<InstrumentRegistry> {
        &self.registry
    }

    pub fn market_data(&self) -> &MarketDataService {
        self.core.market_data()
    }

    pub fn context(&self) -> &PricingContext {
        self.core.context()
    }

    /// Register `listener` for risk on `key`.
    ///
    /// The first listener attaches the market-data bridge and prices the
    /// instrument straight away from whatever market data is already cached,
    /// so it does not have to wait for the next tick.
    pub fn add_listener(&self, key: InstrumentKey, listener: RiskListener) -> Result<ListenerHandle> {
        let handle = self.inner.add_listener(key.clone(), listener)?;
        if handle.opened_upstream() {
            if let Err(e) = self.recompute(&key) {
                debug!(instrument = %key, error = %e, "No initial risk");
            }
        }
        Ok(handle)
    }

    /// Deregister a listener; the last one detaches the bridge
    pub fn remove_listener(&self, key: &InstrumentKey, handle: ListenerHandle) -> bool {
        self.inner.remove_listener(key, handle)
    }

    /// Reprice `key` from cached market data and publish the result.
    ///
    /// Failures are recorded as the instrument's condition and returned.
    pub fn recompute(&self, key: &InstrumentKey) -> Result<RiskResult> {
        match self.core.compute(key, None) {
            Ok(risk) => {
                self.core.clear_condition(key);
                self.inner.publish(key.clone(), risk);
                Ok(risk)
            }
            Err(e) => {
                self.core.record_condition(key, e.clone());
                Err(e)
            }
        }
    }

    /// Last published unit risk for `key`
    pub fn get(&self, key: &InstrumentKey) -> Result<RiskResult> {
        self.inner.get(key).map_err(|e| match e {
            PubSubError::NotFound(key) => RiskError::NotFound(key),
            other => other.into(),
        })
    }

    /// Why the last recompute for `key` did not publish, if it did not
    pub fn condition(&self, key: &InstrumentKey) -> Option<RiskError> {
        self.core.condition(key)
    }

    pub fn start(&self) -> Result<()> {
        Ok(self.inner.start()?)
    }

    /// Detach every bridge and drop all cached risk
    pub fn shutdown(&self) {
        self.inner.shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    pub fn listener_count(&self, key: &InstrumentKey) -> usize {
        self.inner.listener_count(key)
    }

    /// Whether the bridge for `key` is attached
    pub fn has_upstream(&self, key: &InstrumentKey) -> bool {
        self.inner.has_upstream(key)
    }

    pub fn active_keys(&self) -> Vec<InstrumentKey> {
        self.inner.active_keys()
    }
}

impl std::fmt::Debug for RiskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskService")
            .field("valuation_date", &self.core.context().valuation_date)
            .field("instruments", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use common::{DatumKind, Instrument, MarketDatum, OptionType};
    use market_data::ManualFeed;
    use parking_lot::Mutex;

    struct Fixture {
        feed: Arc<ManualFeed>,
        market_data: MarketDataService,
        risk: RiskService,
    }

    fn valuation_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn fixture() -> Fixture {
        let expiry = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let registry = Arc::new(
            InstrumentRegistry::new(vec![
                Instrument::linear("SPX"),
                Instrument::european_option("SPX-C", "SPX", 7275.0, expiry, OptionType::Call)
                    .quoted_in(DatumKind::Volatility),
                Instrument::european_option("SPX-P", "SPX", 7000.0, expiry, OptionType::Put),
                Instrument::european_option("SPX-X", "SPX", 7275.0, valuation_date(), OptionType::Call)
                    .quoted_in(DatumKind::Volatility),
            ])
            .unwrap(),
        );
        let feed = Arc::new(ManualFeed::new());
        let market_data = MarketDataService::new(Arc::clone(&registry), feed.clone());
        let context = PricingContext::new(valuation_date(), 0.0025).with_dividend_yield("SPX", 0.02);
        let risk = RiskService::new(registry, market_data.clone(), context);
        Fixture {
            feed,
            market_data,
            risk,
        }
    }

    fn recording() -> (RiskListener, Arc<Mutex<Vec<RiskResult>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: RiskListener = Arc::new(move |_key: &InstrumentKey, risk: &RiskResult| {
            sink.lock().push(*risk);
        });
        (listener, seen)
    }

    #[test]
    fn test_detached_bridge_ignores_in_flight_update() {
        let f = fixture();
        let (listener, _) = recording();

        // Registered ahead of the bridge, so it runs first in the same
        // notification and drops the only risk listener.
        let handle: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let risk = f.risk.clone();
        let slot = Arc::clone(&handle);
        let remover: market_data::MarketDataListener =
            Arc::new(move |_key: &InstrumentKey, _datum: &MarketDatum| {
                if let Some(h) = slot.lock().take() {
                    risk.remove_listener(&"SPX-C".into(), h);
                }
            });
        f.market_data.add_listener("SPX-C".into(), remover).unwrap();

        *handle.lock() = Some(f.risk.add_listener("SPX-C".into(), listener).unwrap());
        assert_eq!(f.market_data.listener_count(&"SPX-C".into()), 2);

        f.feed.push_value("SPX-C", 0.10);

        assert!(!f.risk.has_upstream(&"SPX-C".into()));
        assert_eq!(f.market_data.listener_count(&"SPX-C".into()), 1);
        assert!(f.risk.condition(&"SPX-C".into()).is_none());
        assert!(f.risk.get(&"SPX-C".into()).is_err());
    }

    #[test]
    fn test_linear_risk_follows_price() {
        let f = fixture();
        let (listener, seen) = recording();
        f.risk.add_listener("SPX".into(), listener).unwrap();
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 1);

        f.feed.push_value("SPX", 7300.0);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].theoretical_value, 7300.0);
        assert_eq!(seen[0].delta, 1.0);
        assert_eq!(f.risk.get(&"SPX".into()).unwrap(), seen[0]);
    }

    #[test]
    fn test_option_bridges_both_legs() {
        let f = fixture();
        let (listener, _) = recording();
        f.risk.add_listener("SPX-C".into(), listener).unwrap();

        assert_eq!(f.market_data.listener_count(&"SPX-C".into()), 1);
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 1);
        assert_eq!(f.feed.active_symbols(), vec!["SPX".to_string(), "SPX-C".to_string()]);
    }

    #[test]
    fn test_cascading_teardown() {
        let f = fixture();
        let (listener, _) = recording();
        let handle = f.risk.add_listener("SPX-C".into(), listener).unwrap();

        assert!(f.risk.remove_listener(&"SPX-C".into(), handle));
        assert_eq!(f.risk.listener_count(&"SPX-C".into()), 0);
        assert!(!f.risk.has_upstream(&"SPX-C".into()));
        assert_eq!(f.market_data.listener_count(&"SPX-C".into()), 0);
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 0);
        assert!(f.feed.active_symbols().is_empty());
    }

    #[test]
    fn test_shared_underlying_survives_one_teardown() {
        let f = fixture();
        let (a, _) = recording();
        let (b, _) = recording();
        let ha = f.risk.add_listener("SPX-C".into(), a).unwrap();
        f.risk.add_listener("SPX-P".into(), b).unwrap();
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 2);

        f.risk.remove_listener(&"SPX-C".into(), ha);
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 1);
        assert!(f.feed.is_subscribed("SPX"));
    }

    #[test]
    fn test_missing_underlying_then_recovery() {
        let f = fixture();
        let (listener, seen) = recording();
        f.risk.add_listener("SPX-C".into(), listener).unwrap();

        f.feed.push_value("SPX-C", 0.10);
        assert!(seen.lock().is_empty());
        assert_matches!(
            f.risk.condition(&"SPX-C".into()),
            Some(RiskError::MissingMarketData { leg, .. }) if leg == "SPX"
        );
        assert_matches!(f.risk.get(&"SPX-C".into()), Err(RiskError::NotFound(_)));

        f.feed.push_value("SPX", 7275.0);
        assert_eq!(seen.lock().len(), 1);
        assert!(f.risk.condition(&"SPX-C".into()).is_none());

        let risk = f.risk.get(&"SPX-C".into()).unwrap();
        assert_eq!(risk.implied_volatility, 0.10);
        assert!(risk.delta > 0.4 && risk.delta < 0.6);
        assert!(risk.gamma > 0.0);
    }

    #[test]
    fn test_forced_recompute_uses_cached_legs() {
        let f = fixture();
        let (listener, seen) = recording();
        f.risk.add_listener("SPX-C".into(), listener).unwrap();
        assert_matches!(
            f.risk.recompute(&"SPX-C".into()),
            Err(RiskError::MissingMarketData { .. })
        );

        f.market_data.publish("SPX".into(), MarketDatum::price(7275.0));
        f.market_data.publish("SPX-C".into(), MarketDatum::volatility(0.10));
        let before = seen.lock().len();

        let risk = f.risk.recompute(&"SPX-C".into()).unwrap();
        assert_eq!(seen.lock().len(), before + 1);
        assert_eq!(f.risk.get(&"SPX-C".into()).unwrap(), risk);
    }

    #[test]
    fn test_first_listener_gets_initial_risk() {
        let f = fixture();
        f.market_data.publish("SPX".into(), MarketDatum::price(7275.0));

        let (listener, seen) = recording();
        f.risk.add_listener("SPX".into(), listener).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].theoretical_value, 7275.0);
    }

    #[test]
    fn test_premium_quote_implies_volatility() {
        let f = fixture();
        let (listener, seen) = recording();
        f.risk.add_listener("SPX-P".into(), listener).unwrap();

        f.feed.push_value("SPX", 7275.0);
        f.feed.push_quote("SPX-P", 24.0, 26.0);

        let last = *seen.lock().last().unwrap();
        assert_abs_diff_eq!(last.theoretical_value, 25.0, epsilon = 0.05);
        assert!(last.implied_volatility > 0.0 && last.implied_volatility < 1.0);
        assert!(last.delta < 0.0);
    }

    #[test]
    fn test_model_error_is_recorded_not_published() {
        let f = fixture();
        let (listener, seen) = recording();
        f.risk.add_listener("SPX-X".into(), listener).unwrap();

        f.feed.push_value("SPX", 7275.0);
        f.feed.push_value("SPX-X", 0.10);
        assert!(seen.lock().is_empty());
        assert_matches!(f.risk.condition(&"SPX-X".into()), Some(RiskError::Model { .. }));
    }

    #[test]
    fn test_unknown_instrument_is_refused() {
        let f = fixture();
        let (listener, _) = recording();
        assert_matches!(
            f.risk.add_listener("NDX".into(), listener),
            Err(RiskError::PubSub(PubSubError::Upstream { .. }))
        );
        assert!(f.feed.active_symbols().is_empty());
    }

    #[test]
    fn test_shutdown_detaches_bridges() {
        let f = fixture();
        let (listener, _) = recording();
        f.risk.add_listener("SPX-C".into(), listener).unwrap();

        f.risk.shutdown();
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 0);
        assert_eq!(f.market_data.listener_count(&"SPX-C".into()), 0);
        assert!(f.risk.is_shut_down());
    }
}
