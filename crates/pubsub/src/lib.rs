//! Keyed publish-subscribe for RiskStream
//!
//! A [`PubSubService`] keeps, per key, the last published value and the list
//! of registered listeners. Upstream subscriptions on its [`DataSource`] are
//! opened when the first listener for a key arrives and closed when the last
//! one leaves.
//!
//! # Key Invariants
//!
//! - An upstream subscription for a key exists iff its listener list is
//!   non-empty. List occupancy is the reference count.
//! - Publishing updates the cache and snapshots the listeners under one lock;
//!   listeners run after the lock is released and may re-enter the service.
//! - A panicking listener is logged and skipped; the others are still notified.

pub mod error;
pub mod listener;
pub mod service;
pub mod source;

pub use error::PubSubError;
pub use listener::{Listener, ListenerHandle};
pub use service::PubSubService;
pub use source::{DataSource, PassiveSource, Publisher, Upstream};

/// Result type for pub-sub operations
pub type Result<T> = std::result::Result<T, PubSubError>;
