//! Listener trait and registration handles

use common::SubscriptionId;

/// Receives every value published for the keys it is registered on.
///
/// Called synchronously on the publishing thread, outside the service lock.
/// Implementations must be quick; slow work belongs on their own worker.
pub trait Listener<K, V>: Send + Sync {
    fn on_update(&self, key: &K, value: &V);
}

impl<K, V, F> Listener<K, V> for F
where
    F: Fn(&K, &V) + Send + Sync,
{
    fn on_update(&self, key: &K, value: &V) {
        self(key, value)
    }
}

/// Returned by [`PubSubService::add_listener`](crate::PubSubService::add_listener);
/// pass it back to remove that registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: SubscriptionId,
    opened_upstream: bool,
}

impl ListenerHandle {
    pub(crate) fn new(opened_upstream: bool) -> Self {
        Self {
            id: SubscriptionId::new(),
            opened_upstream,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// True when this registration was the first for its key and opened
    /// the upstream subscription.
    pub fn opened_upstream(&self) -> bool {
        self.opened_upstream
    }
}
