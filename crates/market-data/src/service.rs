//! The market-data service

use crate::error::MarketDataError;
use crate::feed::FeedAdapter;
use crate::source::FeedDataSource;
use crate::store::MarketDataStore;
use crate::Result;
use common::{InstrumentKey, InstrumentRegistry, MarketDatum};
use pubsub::{DataSource, Listener, ListenerHandle, PubSubError, PubSubService};
use std::sync::Arc;
use tracing::debug;

/// Service name used in logs and metric labels
pub const SERVICE_NAME: &str = "market-data";

/// Listener on market data updates
pub type MarketDataListener = Arc<dyn Listener<InstrumentKey, MarketDatum>>;

/// Last-known prices and volatilities per instrument, fed on demand.
///
/// Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct MarketDataService {
    inner: PubSubService<InstrumentKey, MarketDatum>,
    store: Option<Arc<dyn MarketDataStore>>,
}

impl MarketDataService {
    /// Service subscribing instruments from `registry` on `feed`
    pub fn new(registry: Arc<InstrumentRegistry>, feed: Arc<dyn FeedAdapter>) -> Self {
        Self::with_source(Arc::new(FeedDataSource::new(registry, feed)))
    }

    /// Service over an arbitrary data source
    pub fn with_source(source: Arc<dyn DataSource<InstrumentKey, MarketDatum>>) -> Self {
        Self {
            inner: PubSubService::new(SERVICE_NAME, source),
            store: None,
        }
    }

    /// Consult `store` when `get` misses the cache
    pub fn with_store(mut self, store: Arc<dyn MarketDataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_listener(&self, key: InstrumentKey, listener: MarketDataListener) -> Result<ListenerHandle> {
        Ok(self.inner.add_listener(key, listener)?)
    }

    pub fn remove_listener(&self, key: &InstrumentKey, handle: ListenerHandle) -> bool {
        self.inner.remove_listener(key, handle)
    }

    pub fn publish(&self, key: InstrumentKey, datum: MarketDatum) {
        self.inner.publish(key, datum)
    }

    /// Last datum for `key`, falling back to the backing store on a miss.
    ///
    /// A stored value fills the cache without notifying listeners, and only
    /// if nothing was published for the key in the meantime.
    pub fn get(&self, key: &InstrumentKey) -> Result<MarketDatum> {
        match self.inner.get(key) {
            Ok(datum) => return Ok(datum),
            Err(PubSubError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let Some(store) = &self.store else {
            return Err(MarketDataError::NotFound(key.to_string()));
        };
        match store.find_latest(key)? {
            Some(datum) => {
                if self.inner.seed_if_absent(key.clone(), datum) {
                    debug!(%key, "Filled cache from store");
                }
                Ok(self.inner.get(key).unwrap_or(datum))
            }
            None => Err(MarketDataError::NotFound(key.to_string())),
        }
    }

    pub fn start(&self) -> Result<()> {
        Ok(self.inner.start()?)
    }

    pub fn shutdown(&self) {
        self.inner.shutdown()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    pub fn listener_count(&self, key: &InstrumentKey) -> usize {
        self.inner.listener_count(key)
    }

    /// Whether a feed subscription is open for `key`
    pub fn has_upstream(&self, key: &InstrumentKey) -> bool {
        self.inner.has_upstream(key)
    }

    pub fn active_keys(&self) -> Vec<InstrumentKey> {
        self.inner.active_keys()
    }
}

impl std::fmt::Debug for MarketDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataService")
            .field("read_through", &self.store.is_some())
            .finish()
    }
}
