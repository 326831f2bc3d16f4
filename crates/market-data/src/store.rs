//! Backing store consulted on cache misses

use crate::Result;
use common::{InstrumentKey, MarketDatum};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistent source of last-known market data
pub trait MarketDataStore: Send + Sync {
    /// Most recent stored datum for `key`, if any
    fn find_latest(&self, key: &InstrumentKey) -> Result<Option<MarketDatum>>;
}

/// Store held in memory, typically seeded from a configuration snapshot
#[derive(Debug, Default)]
pub struct InMemoryMarketDataStore {
    data: RwLock<HashMap<InstrumentKey, MarketDatum>>,
}

impl InMemoryMarketDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: InstrumentKey, datum: MarketDatum) {
        self.data.write().insert(key, datum);
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl FromIterator<(InstrumentKey, MarketDatum)> for InMemoryMarketDataStore {
    fn from_iter<I: IntoIterator<Item = (InstrumentKey, MarketDatum)>>(iter: I) -> Self {
        Self {
            data: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl MarketDataStore for InMemoryMarketDataStore {
    fn find_latest(&self, key: &InstrumentKey) -> Result<Option<MarketDatum>> {
        Ok(self.data.read().get(key).copied())
    }
}
