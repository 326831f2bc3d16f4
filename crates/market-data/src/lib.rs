//! Market Data Layer for RiskStream
//!
//! A keyed pub-sub service over instrument prices and volatilities. The first
//! listener on an instrument subscribes its feed symbol; the last one leaving
//! unsubscribes it.
//!
//! # Core Components
//!
//! - [`feed`] - Feed adapter interface and tick type
//! - [`manual`] - In-process feed driven by the caller
//! - [`simulated`] - Random-walk feed running on a tokio runtime
//! - [`source`] - Bridges a feed adapter into the pub-sub data source contract
//! - [`store`] - Read-through backing store
//! - [`service`] - The market-data service itself
//!
//! # Key Invariants
//!
//! - A feed symbol is subscribed iff its instrument has at least one listener
//! - Read-through fills never overwrite a value published in the meantime
//! - Feed callbacks never run under the service lock

pub mod error;
pub mod feed;
pub mod manual;
pub mod service;
pub mod simulated;
pub mod source;
pub mod store;

pub use error::MarketDataError;
pub use feed::{FeedAdapter, FeedCallback, FeedTick};
pub use manual::ManualFeed;
pub use service::{MarketDataListener, MarketDataService};
pub use simulated::{SimulatedFeed, SimulatedFeedConfig};
pub use source::FeedDataSource;
pub use store::{InMemoryMarketDataStore, MarketDataStore};

pub type Result<T> = std::result::Result<T, MarketDataError>;
