//! Feed-backed data source for the market-data service

use crate::feed::{FeedAdapter, FeedCallback, FeedTick};
use common::{InstrumentKey, InstrumentRegistry, MarketDatum};
use pubsub::{DataSource, PubSubError, Publisher, Upstream};
use std::sync::Arc;
use tracing::debug;

/// Opens one feed subscription per instrument, translating the instrument
/// key to its feed symbol and each tick to a datum of the instrument's quote
/// kind.
pub struct FeedDataSource {
    registry: Arc<InstrumentRegistry>,
    feed: Arc<dyn FeedAdapter>,
}

impl FeedDataSource {
    pub fn new(registry: Arc<InstrumentRegistry>, feed: Arc<dyn FeedAdapter>) -> Self {
        Self { registry, feed }
    }
}

impl DataSource<InstrumentKey, MarketDatum> for FeedDataSource {
    fn start(&self) -> pubsub::Result<()> {
        self.feed
            .start()
            .map_err(|e| PubSubError::upstream("feed", e.to_string()))
    }

    fn open(
        &self,
        key: &InstrumentKey,
        publisher: Publisher<InstrumentKey, MarketDatum>,
    ) -> pubsub::Result<Box<dyn Upstream>> {
        let instrument = self
            .registry
            .get(key)
            .ok_or_else(|| PubSubError::upstream(key, "instrument not in registry"))?;

        let symbol = instrument.feed_symbol().to_string();
        let kind = instrument.quote;
        let target = key.clone();
        let callback: FeedCallback = Arc::new(move |tick: FeedTick| {
            publisher.publish(target.clone(), tick.to_datum(kind));
        });

        self.feed
            .subscribe(&symbol, callback)
            .map_err(|e| PubSubError::upstream(key, e.to_string()))?;
        debug!(%key, %symbol, "Feed subscription opened");

        let feed = Arc::clone(&self.feed);
        Ok(Box::new(move || feed.unsubscribe(&symbol)))
    }

    fn shutdown(&self) {
        self.feed.shutdown();
    }
}
