//! Upstream data sources
//!
//! A [`DataSource`] is asked to open an upstream subscription when a key gets
//! its first listener. It feeds values back through the [`Publisher`] it was
//! given, and the returned [`Upstream`] is closed when the last listener leaves.

use crate::service::Shared;
use crate::Result;
use std::hash::Hash;
use std::sync::Weak;

/// Live upstream subscription for one key
pub trait Upstream: Send {
    /// Tear the subscription down. Called exactly once.
    fn close(self: Box<Self>);
}

impl<F> Upstream for F
where
    F: FnOnce() + Send,
{
    fn close(self: Box<Self>) {
        (*self)()
    }
}

/// Source of values for a [`PubSubService`](crate::PubSubService)
///
/// `open` runs while the service holds its registry lock, so it must return
/// quickly and must not publish into the same service synchronously. Slow
/// subscribe work (network I/O) goes onto the source's own worker.
pub trait DataSource<K, V>: Send + Sync {
    /// Called from [`PubSubService::start`](crate::PubSubService::start)
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Begin delivering values for `key` into `publisher`
    fn open(&self, key: &K, publisher: Publisher<K, V>) -> Result<Box<dyn Upstream>>;

    /// Called from [`PubSubService::shutdown`](crate::PubSubService::shutdown)
    /// after every upstream has been closed
    fn shutdown(&self) {}
}

/// Source with no upstream: values arrive only through explicit `publish`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassiveSource;

impl<K, V> DataSource<K, V> for PassiveSource {
    fn open(&self, _key: &K, _publisher: Publisher<K, V>) -> Result<Box<dyn Upstream>> {
        Ok(Box::new(|| {}))
    }
}

/// Weak handle a data source uses to push values into its service.
///
/// Holding a publisher does not keep the service alive.
pub struct Publisher<K, V> {
    shared: Weak<Shared<K, V>>,
}

impl<K, V> Publisher<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(shared: Weak<Shared<K, V>>) -> Self {
        Self { shared }
    }

    /// Publish into the owning service. Returns false once it has been dropped.
    pub fn publish(&self, key: K, value: V) -> bool {
        match self.shared.upgrade() {
            Some(shared) => {
                shared.publish(key, value);
                true
            }
            None => false,
        }
    }
}

impl<K, V> Clone for Publisher<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}
