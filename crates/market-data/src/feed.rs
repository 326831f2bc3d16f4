//! Feed adapter interface
//!
//! The market-data layer talks to live feeds only through [`FeedAdapter`].
//! Adapters address instruments by feed symbol and deliver [`FeedTick`]s to
//! the callback registered for that symbol.

use crate::Result;
use chrono::{DateTime, Utc};
use common::{DatumKind, MarketDatum};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One quote from a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedTick {
    pub symbol: String,
    pub bid: f64,
    pub offer: f64,
    pub timestamp: DateTime<Utc>,
}

impl FeedTick {
    pub fn new(symbol: impl Into<String>, bid: f64, offer: f64) -> Self {
        Self {
            symbol: symbol.into(),
            bid,
            offer,
            timestamp: Utc::now(),
        }
    }

    /// Interpret the quote as a datum of the given kind
    pub fn to_datum(&self, kind: DatumKind) -> MarketDatum {
        MarketDatum::two_sided(self.bid, self.offer, kind).with_timestamp(self.timestamp)
    }
}

/// Receives ticks for one subscribed symbol
pub type FeedCallback = Arc<dyn Fn(FeedTick) + Send + Sync>;

/// Streaming market data feed.
///
/// `subscribe` and `unsubscribe` are called while the market-data service
/// holds its registry lock. They must not block on I/O and must not invoke
/// the callback synchronously; network work belongs on the adapter's own
/// worker.
pub trait FeedAdapter: Send + Sync {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Start delivering ticks for `symbol` to `callback`
    fn subscribe(&self, symbol: &str, callback: FeedCallback) -> Result<()>;

    /// Stop delivering ticks for `symbol`. Unknown symbols are ignored.
    fn unsubscribe(&self, symbol: &str);

    fn shutdown(&self) {}
}
