//! Position layer
//!
//! Each holding listens to the risk service (scaled Greeks) and to the
//! market-data service (mark and P&L) for its instrument.

use crate::error::RiskError;
use crate::service::{RiskListener, RiskService};
use crate::types::{AggregateRisk, Holding, PositionSnapshot};
use crate::Result;
use common::{DatumKind, InstrumentKey, MarketDatum};
use market_data::{MarketDataListener, MarketDataService};
use parking_lot::Mutex;
use pricing::RiskResult;
use pubsub::ListenerHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

struct Entry {
    snapshot: PositionSnapshot,
    quote: DatumKind,
    handles: Option<(ListenerHandle, ListenerHandle)>,
}

type Book = Mutex<HashMap<InstrumentKey, Entry>>;

fn mark_from_datum(entry: &mut Entry, datum: &MarketDatum) {
    if datum.kind() != DatumKind::Price {
        return;
    }
    let mark = if entry.snapshot.holding.is_long() {
        datum.bid()
    } else {
        datum.offer()
    };
    entry.snapshot.apply_mark(mark);
}

fn mark_from_risk(entry: &mut Entry, unit: &RiskResult) {
    entry.snapshot.apply_risk(*unit);
    if entry.quote == DatumKind::Volatility {
        entry.snapshot.apply_mark(unit.theoretical_value);
    }
}

/// Holdings marked and risked live from the lower layers
#[derive(Clone)]
pub struct PositionService {
    risk: RiskService,
    book: Arc<Book>,
}

impl PositionService {
    pub fn new(risk: RiskService) -> Self {
        Self {
            risk,
            book: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn market_data(&self) -> &MarketDataService {
        self.risk.market_data()
    }

    /// Start tracking `holding`. One holding per instrument.
    pub fn add_holding(&self, holding: Holding) -> Result<()> {
        if !holding.size.is_finite() || holding.size == 0.0 {
            return Err(RiskError::InvalidPosition(format!(
                "{} has size {}",
                holding.instrument, holding.size
            )));
        }
        if !holding.open_price.is_finite() {
            return Err(RiskError::InvalidPosition(format!(
                "{} has open price {}",
                holding.instrument, holding.open_price
            )));
        }
        let instrument = self
            .risk
            .registry()
            .get(&holding.instrument)
            .ok_or_else(|| RiskError::UnknownInstrument(holding.instrument.to_string()))?;

        let key = holding.instrument.clone();
        let underlying = instrument.underlying().cloned().unwrap_or_else(|| key.clone());
        let quote = instrument.quote;

        {
            let mut book = self.book.lock();
            if book.contains_key(&key) {
                return Err(RiskError::InvalidPosition(format!("{} already held", key)));
            }
            book.insert(
                key.clone(),
                Entry {
                    snapshot: PositionSnapshot::new(holding, underlying),
                    quote,
                    handles: None,
                },
            );
        }

        // Subscribing can deliver synchronously into the book, so the book
        // lock is not held here.
        let handles = match self.subscribe(&key) {
            Ok(handles) => handles,
            Err(e) => {
                self.book.lock().remove(&key);
                return Err(e);
            }
        };

        let orphaned = {
            let mut book = self.book.lock();
            match book.get_mut(&key) {
                Some(entry) => {
                    entry.handles = Some(handles);
                    None
                }
                None => Some(handles),
            }
        };
        if let Some(handles) = orphaned {
            self.unsubscribe(&key, handles);
        }

        info!(instrument = %key, "Holding added");
        Ok(())
    }

    fn subscribe(&self, key: &InstrumentKey) -> Result<(ListenerHandle, ListenerHandle)> {
        let book: Weak<Book> = Arc::downgrade(&self.book);
        let on_risk: RiskListener = Arc::new(move |key: &InstrumentKey, risk: &RiskResult| {
            if let Some(book) = book.upgrade() {
                if let Some(entry) = book.lock().get_mut(key) {
                    mark_from_risk(entry, risk);
                }
            }
        });
        let risk_handle = self.risk.add_listener(key.clone(), on_risk)?;

        let book: Weak<Book> = Arc::downgrade(&self.book);
        let on_price: MarketDataListener = Arc::new(move |key: &InstrumentKey, datum: &MarketDatum| {
            if let Some(book) = book.upgrade() {
                if let Some(entry) = book.lock().get_mut(key) {
                    mark_from_datum(entry, datum);
                }
            }
        });
        let price_handle = match self.market_data().add_listener(key.clone(), on_price) {
            Ok(handle) => handle,
            Err(e) => {
                self.risk.remove_listener(key, risk_handle);
                return Err(e.into());
            }
        };

        // Risk and marks cached before we subscribed; the risk service only
        // recomputes for its first listener on a key.
        if let Ok(unit) = self.risk.get(key) {
            if let Some(entry) = self.book.lock().get_mut(key) {
                if entry.snapshot.unit_risk.is_none() {
                    mark_from_risk(entry, &unit);
                }
            }
        }
        if let Ok(datum) = self.market_data().get(key) {
            if let Some(entry) = self.book.lock().get_mut(key) {
                mark_from_datum(entry, &datum);
            }
        }
        Ok((risk_handle, price_handle))
    }

    fn unsubscribe(&self, key: &InstrumentKey, (risk_handle, price_handle): (ListenerHandle, ListenerHandle)) {
        self.market_data().remove_listener(key, price_handle);
        self.risk.remove_listener(key, risk_handle);
    }

    /// Stop tracking the holding in `key`, releasing its subscriptions
    pub fn remove_holding(&self, key: &InstrumentKey) -> Result<Holding> {
        let entry = self
            .book
            .lock()
            .remove(key)
            .ok_or_else(|| RiskError::InvalidPosition(format!("{} not held", key)))?;
        if let Some(handles) = entry.handles {
            self.unsubscribe(key, handles);
        }
        info!(instrument = %key, "Holding removed");
        Ok(entry.snapshot.holding)
    }

    /// Remove every holding
    pub fn close(&self) {
        let entries: Vec<(InstrumentKey, Entry)> = self.book.lock().drain().collect();
        let closed = entries.len();
        for (key, entry) in entries {
            if let Some(handles) = entry.handles {
                self.unsubscribe(&key, handles);
            }
        }
        debug!(closed, "Position service closed");
    }

    pub fn snapshot(&self, key: &InstrumentKey) -> Option<PositionSnapshot> {
        self.book.lock().get(key).map(|entry| entry.snapshot.clone())
    }

    /// All holdings, ordered by instrument
    pub fn snapshots(&self) -> Vec<PositionSnapshot> {
        let mut snapshots: Vec<PositionSnapshot> = self
            .book
            .lock()
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect();
        snapshots.sort_by(|a, b| a.holding.instrument.cmp(&b.holding.instrument));
        snapshots
    }

    /// Holdings grouped by underlying
    pub fn by_underlying(&self) -> BTreeMap<InstrumentKey, Vec<PositionSnapshot>> {
        let mut groups: BTreeMap<InstrumentKey, Vec<PositionSnapshot>> = BTreeMap::new();
        for snapshot in self.snapshots() {
            groups
                .entry(snapshot.underlying.clone())
                .or_default()
                .push(snapshot);
        }
        groups
    }

    /// Scaled risk and P&L summed over the holdings on `underlying`
    pub fn aggregate(&self, underlying: &InstrumentKey) -> AggregateRisk {
        let mut aggregate = AggregateRisk::new(underlying.clone());
        for entry in self.book.lock().values() {
            if &entry.snapshot.underlying == underlying {
                aggregate.add(&entry.snapshot);
            }
        }
        aggregate
    }

    /// One aggregate per underlying held
    pub fn aggregates(&self) -> Vec<AggregateRisk> {
        self.by_underlying()
            .into_iter()
            .map(|(underlying, snapshots)| {
                let mut aggregate = AggregateRisk::new(underlying);
                for snapshot in &snapshots {
                    aggregate.add(snapshot);
                }
                aggregate
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.book.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.book.lock().is_empty()
    }
}

impl std::fmt::Debug for PositionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionService")
            .field("holdings", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use common::{Instrument, InstrumentRegistry, OptionType};
    use market_data::ManualFeed;
    use pricing::PricingContext;

    struct Fixture {
        feed: Arc<ManualFeed>,
        market_data: MarketDataService,
        risk: RiskService,
        positions: PositionService,
    }

    fn fixture() -> Fixture {
        let valuation = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let registry = Arc::new(
            InstrumentRegistry::new(vec![
                Instrument::linear("SPX"),
                Instrument::linear("NDX"),
                Instrument::european_option("SPX-C", "SPX", 7275.0, expiry, OptionType::Call)
                    .quoted_in(DatumKind::Volatility),
                Instrument::european_option("SPX-P", "SPX", 7000.0, expiry, OptionType::Put),
            ])
            .unwrap(),
        );
        let feed = Arc::new(ManualFeed::new());
        let market_data = MarketDataService::new(Arc::clone(&registry), feed.clone());
        let risk = RiskService::new(
            registry,
            market_data.clone(),
            PricingContext::new(valuation, 0.0025).with_dividend_yield("SPX", 0.02),
        );
        let positions = PositionService::new(risk.clone());
        Fixture {
            feed,
            market_data,
            risk,
            positions,
        }
    }

    #[test]
    fn test_long_marks_at_bid_short_at_offer() {
        let f = fixture();
        f.positions.add_holding(Holding::new("SPX", 2.0, 7200.0)).unwrap();
        f.positions.add_holding(Holding::new("NDX", -1.0, 20000.0)).unwrap();

        f.feed.push_quote("SPX", 7270.0, 7280.0);
        f.feed.push_quote("NDX", 19990.0, 20010.0);

        let spx = f.positions.snapshot(&"SPX".into()).unwrap();
        assert_eq!(spx.mark, Some(7270.0));
        assert_eq!(spx.pnl, Some(140.0));

        let ndx = f.positions.snapshot(&"NDX".into()).unwrap();
        assert_eq!(ndx.mark, Some(20010.0));
        assert_eq!(ndx.pnl, Some(-10.0));
    }

    #[test]
    fn test_risk_is_scaled_by_size() {
        let f = fixture();
        f.positions.add_holding(Holding::new("SPX-C", -10.0, 80.0)).unwrap();

        f.feed.push_value("SPX", 7275.0);
        f.feed.push_value("SPX-C", 0.10);

        let snapshot = f.positions.snapshot(&"SPX-C".into()).unwrap();
        let unit = snapshot.unit_risk.unwrap();
        let scaled = snapshot.risk.unwrap();
        assert_abs_diff_eq!(scaled.delta, unit.delta * -10.0, epsilon = 1e-12);
        assert_eq!(scaled.implied_volatility, unit.implied_volatility);
        assert_eq!(f.risk.get(&"SPX-C".into()).unwrap(), unit);
    }

    #[test]
    fn test_volatility_quoted_marks_at_theoretical_value() {
        let f = fixture();
        f.positions.add_holding(Holding::new("SPX-C", 1.0, 50.0)).unwrap();

        f.feed.push_value("SPX", 7275.0);
        f.feed.push_value("SPX-C", 0.10);

        let snapshot = f.positions.snapshot(&"SPX-C".into()).unwrap();
        let unit = snapshot.unit_risk.unwrap();
        assert_eq!(snapshot.mark, Some(unit.theoretical_value));
        assert_abs_diff_eq!(snapshot.pnl.unwrap(), unit.theoretical_value - 50.0, epsilon = 1e-12);
    }

    #[test]
    fn test_initial_mark_from_cache() {
        let f = fixture();
        f.market_data.publish("SPX".into(), MarketDatum::two_sided(7270.0, 7280.0, DatumKind::Price));
        f.positions.add_holding(Holding::new("SPX", 1.0, 7260.0)).unwrap();

        let snapshot = f.positions.snapshot(&"SPX".into()).unwrap();
        assert_eq!(snapshot.mark, Some(7270.0));
        assert_eq!(snapshot.risk.unwrap().delta, 1.0);
    }

    #[test]
    fn test_holding_picks_up_risk_cached_by_earlier_subscriber() {
        let f = fixture();
        let watcher: RiskListener = Arc::new(|_: &InstrumentKey, _: &RiskResult| {});
        f.risk.add_listener("SPX-C".into(), watcher).unwrap();
        f.feed.push_value("SPX", 7275.0);
        f.feed.push_value("SPX-C", 0.10);
        let cached = f.risk.get(&"SPX-C".into()).unwrap();

        f.positions.add_holding(Holding::new("SPX-C", 3.0, 50.0)).unwrap();

        let snapshot = f.positions.snapshot(&"SPX-C".into()).unwrap();
        assert_eq!(snapshot.unit_risk, Some(cached));
        assert_abs_diff_eq!(snapshot.risk.unwrap().delta, cached.delta * 3.0, epsilon = 1e-12);
        assert_eq!(snapshot.mark, Some(cached.theoretical_value));
        assert!(snapshot.pnl.is_some());
        assert_eq!(f.positions.aggregate(&"SPX".into()).unpriced, 0);
    }

    #[test]
    fn test_aggregate_by_underlying() {
        let f = fixture();
        f.positions.add_holding(Holding::new("SPX", -1.0, 7275.0)).unwrap();
        f.positions.add_holding(Holding::new("SPX-C", 2.0, 80.0)).unwrap();
        f.positions.add_holding(Holding::new("NDX", 1.0, 20000.0)).unwrap();

        f.feed.push_value("SPX", 7275.0);
        f.feed.push_value("SPX-C", 0.10);

        let groups = f.positions.by_underlying();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&InstrumentKey::from("SPX")].len(), 2);

        let spx = f.positions.aggregate(&"SPX".into());
        let call_delta = f.risk.get(&"SPX-C".into()).unwrap().delta;
        assert_eq!(spx.positions, 2);
        assert_eq!(spx.unpriced, 0);
        assert_abs_diff_eq!(spx.delta, 2.0 * call_delta - 1.0, epsilon = 1e-12);

        let ndx = f.positions.aggregate(&"NDX".into());
        assert_eq!(ndx.unpriced, 1);
        assert_eq!(f.positions.aggregates().len(), 2);
    }

    #[test]
    fn test_remove_and_close_release_subscriptions() {
        let f = fixture();
        f.positions.add_holding(Holding::new("SPX-C", 1.0, 80.0)).unwrap();
        f.positions.add_holding(Holding::new("NDX", 1.0, 20000.0)).unwrap();

        let removed = f.positions.remove_holding(&"SPX-C".into()).unwrap();
        assert_eq!(removed.size, 1.0);
        assert_eq!(f.risk.listener_count(&"SPX-C".into()), 0);
        assert_eq!(f.market_data.listener_count(&"SPX-C".into()), 0);
        assert_eq!(f.market_data.listener_count(&"SPX".into()), 0);

        f.positions.close();
        assert!(f.positions.is_empty());
        assert!(f.feed.active_symbols().is_empty());
    }

    #[test]
    fn test_rejects_bad_holdings() {
        let f = fixture();
        assert_matches!(
            f.positions.add_holding(Holding::new("SPX", 0.0, 1.0)),
            Err(RiskError::InvalidPosition(_))
        );
        assert_matches!(
            f.positions.add_holding(Holding::new("RUT", 1.0, 1.0)),
            Err(RiskError::UnknownInstrument(_))
        );
        f.positions.add_holding(Holding::new("SPX", 1.0, 1.0)).unwrap();
        assert_matches!(
            f.positions.add_holding(Holding::new("SPX", 1.0, 1.0)),
            Err(RiskError::InvalidPosition(_))
        );
        assert_matches!(
            f.positions.remove_holding(&"NDX".into()),
            Err(RiskError::InvalidPosition(_))
        );
    }
}
