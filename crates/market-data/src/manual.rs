//! Caller-driven feed for replay and tests

use crate::error::MarketDataError;
use crate::feed::{FeedAdapter, FeedCallback, FeedTick};
use crate::Result;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, trace};

/// In-process feed: records which symbols are subscribed and forwards ticks
/// pushed by the caller to the matching subscription.
#[derive(Default)]
pub struct ManualFeed {
    subscriptions: Mutex<HashMap<String, FeedCallback>>,
    subscribe_calls: AtomicUsize,
    shut_down: AtomicBool,
}

impl ManualFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `tick` to its symbol's subscriber. Returns false if nobody is
    /// subscribed to the symbol.
    pub fn push(&self, tick: FeedTick) -> bool {
        // Clone out so the callback runs without our lock held; it may
        // cascade into subscribe/unsubscribe on this feed.
        let callback = self.subscriptions.lock().get(&tick.symbol).cloned();
        match callback {
            Some(callback) => {
                callback(tick);
                true
            }
            None => {
                trace!(symbol = %tick.symbol, "Dropping tick for unsubscribed symbol");
                false
            }
        }
    }

    /// Push a two-sided quote observed now
    pub fn push_quote(&self, symbol: &str, bid: f64, offer: f64) -> bool {
        self.push(FeedTick::new(symbol, bid, offer))
    }

    /// Push a single-valued quote observed now
    pub fn push_value(&self, symbol: &str, value: f64) -> bool {
        self.push_quote(symbol, value, value)
    }

    pub fn is_subscribed(&self, symbol: &str) -> bool {
        self.subscriptions.lock().contains_key(symbol)
    }

    /// Currently subscribed symbols, sorted
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.subscriptions.lock().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Total subscribe requests received
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::Relaxed)
    }
}

impl FeedAdapter for ManualFeed {
    fn subscribe(&self, symbol: &str, callback: FeedCallback) -> Result<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(MarketDataError::feed("manual feed is shut down"));
        }
        self.subscribe_calls.fetch_add(1, Ordering::Relaxed);
        match self.subscriptions.lock().entry(symbol.to_string()) {
            Entry::Occupied(_) => Err(MarketDataError::Subscription(format!(
                "{} subscribed twice",
                symbol
            ))),
            Entry::Vacant(entry) => {
                entry.insert(callback);
                debug!(%symbol, "Manual feed subscribed");
                Ok(())
            }
        }
    }

    fn unsubscribe(&self, symbol: &str) {
        if self.subscriptions.lock().remove(symbol).is_some() {
            debug!(%symbol, "Manual feed unsubscribed");
        }
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.subscriptions.lock().clear();
    }
}
