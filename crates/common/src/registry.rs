//! Instrument reference data lookup
//!
//! The registry is built once, before any service that consults it, and is
//! then shared read-only (usually behind an `Arc`).

use crate::error::{Error, Result};
use crate::types::{Instrument, InstrumentKey};
use std::collections::HashMap;

/// Immutable lookup of instrument definitions by key and by feed symbol.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    instruments: HashMap<InstrumentKey, Instrument>,
    by_feed_symbol: HashMap<String, InstrumentKey>,
}

impl InstrumentRegistry {
    /// Build a registry, checking keys are unique and every option's
    /// underlying is itself a registered, non-derivative instrument.
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Result<Self> {
        let mut registry = Self::default();

        for instrument in instruments {
            if registry.instruments.contains_key(&instrument.key) {
                return Err(Error::DuplicateInstrument(instrument.key.to_string()));
            }
            let symbol = instrument.feed_symbol().to_string();
            if let Some(existing) = registry.by_feed_symbol.get(&symbol) {
                return Err(Error::invalid_input(format!(
                    "feed symbol '{}' used by both {} and {}",
                    symbol, existing, instrument.key
                )));
            }
            registry.by_feed_symbol.insert(symbol, instrument.key.clone());
            registry.instruments.insert(instrument.key.clone(), instrument);
        }

        for instrument in registry.instruments.values() {
            if let Some(underlying) = instrument.underlying() {
                match registry.instruments.get(underlying) {
                    None => {
                        return Err(Error::not_found(format!(
                            "underlying {} of {}",
                            underlying, instrument.key
                        )))
                    }
                    Some(u) if u.is_derivative() => {
                        return Err(Error::invalid_input(format!(
                            "underlying {} of {} is itself a derivative",
                            underlying, instrument.key
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(registry)
    }

    pub fn get(&self, key: &InstrumentKey) -> Option<&Instrument> {
        self.instruments.get(key)
    }

    /// Like [`get`](Self::get) but fails with [`Error::NotFound`]
    pub fn require(&self, key: &InstrumentKey) -> Result<&Instrument> {
        self.get(key)
            .ok_or_else(|| Error::not_found(format!("instrument {}", key)))
    }

    /// Reverse lookup from the feed's addressing scheme
    pub fn by_feed_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.by_feed_symbol
            .get(symbol)
            .and_then(|key| self.instruments.get(key))
    }

    pub fn contains(&self, key: &InstrumentKey) -> bool {
        self.instruments.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
