//! The keyed publish-subscribe service

use crate::error::PubSubError;
use crate::listener::{Listener, ListenerHandle};
use crate::source::{DataSource, PassiveSource, Publisher, Upstream};
use crate::Result;
use common::SubscriptionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use observability::ServiceMetrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace};

struct Registration<K, V> {
    id: SubscriptionId,
    listener: Arc<dyn Listener<K, V>>,
}

/// Listeners and upstream for one key. Present in the registry only while
/// `listeners` is non-empty.
struct KeyState<K, V> {
    listeners: Vec<Registration<K, V>>,
    upstream: Box<dyn Upstream>,
}

pub(crate) struct Shared<K, V> {
    name: String,
    registry: Mutex<HashMap<K, KeyState<K, V>>>,
    cache: DashMap<K, V>,
    source: Arc<dyn DataSource<K, V>>,
    metrics: ServiceMetrics,
    shut_down: AtomicBool,
}

impl<K, V> Shared<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn publish(&self, key: K, value: V) {
        let snapshot: Vec<(SubscriptionId, Arc<dyn Listener<K, V>>)> = {
            let registry = self.registry.lock();
            if self.shut_down.load(Ordering::Acquire) {
                trace!(service = %self.name, %key, "Dropping publish after shutdown");
                return;
            }
            self.cache.insert(key.clone(), value.clone());
            registry
                .get(&key)
                .map(|state| {
                    state
                        .listeners
                        .iter()
                        .map(|r| (r.id, Arc::clone(&r.listener)))
                        .collect()
                })
                .unwrap_or_default()
        };

        let started = Instant::now();
        for (id, listener) in &snapshot {
            self.notify(*id, listener.as_ref(), &key, &value);
        }
        self.metrics.record_publish(snapshot.len(), started.elapsed());
    }

    fn notify(&self, id: SubscriptionId, listener: &dyn Listener<K, V>, key: &K, value: &V) {
        let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_update(key, value)));
        if let Err(payload) = outcome {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            let err = PubSubError::Listener {
                key: key.to_string(),
                listener: id.to_string(),
                message,
            };
            self.metrics.listener_failed();
            error!(service = %self.name, error = %err, "Listener failed during notification");
        }
    }
}

/// Keyed cache plus listener registry over a [`DataSource`].
///
/// Cloning is cheap and yields another handle to the same service.
pub struct PubSubService<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for PubSubService<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> PubSubService<K, V>
where
    K: Clone + Eq + Hash + std::fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a service named `name` (used in logs and metric labels)
    pub fn new(name: impl Into<String>, source: Arc<dyn DataSource<K, V>>) -> Self {
        let name = name.into();
        let metrics = ServiceMetrics::new(&name);
        Self {
            shared: Arc::new(Shared {
                name,
                registry: Mutex::new(HashMap::new()),
                cache: DashMap::new(),
                source,
                metrics,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Service with no upstream; values arrive only through [`publish`](Self::publish)
    pub fn passive(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(PassiveSource))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Register `listener` for `key`.
    ///
    /// The first listener for a key opens the upstream subscription. If the
    /// data source refuses, nothing is registered and the error is returned.
    /// Registering the same listener twice yields two handles and two
    /// notifications per publish.
    pub fn add_listener(&self, key: K, listener: Arc<dyn Listener<K, V>>) -> Result<ListenerHandle> {
        let mut registry = self.shared.registry.lock();
        if self.shared.shut_down.load(Ordering::Acquire) {
            return Err(PubSubError::ShutDown(self.shared.name.clone()));
        }

        match registry.get_mut(&key) {
            Some(state) => {
                let handle = ListenerHandle::new(false);
                state.listeners.push(Registration {
                    id: handle.id(),
                    listener,
                });
                debug!(
                    service = %self.shared.name,
                    %key,
                    listeners = state.listeners.len(),
                    "Listener added"
                );
                Ok(handle)
            }
            None => {
                let publisher = Publisher::new(Arc::downgrade(&self.shared));
                let upstream = self.shared.source.open(&key, publisher)?;
                self.shared.metrics.upstream_opened();

                let handle = ListenerHandle::new(true);
                debug!(service = %self.shared.name, %key, "Upstream opened for first listener");
                registry.insert(
                    key,
                    KeyState {
                        listeners: vec![Registration {
                            id: handle.id(),
                            listener,
                        }],
                        upstream,
                    },
                );
                Ok(handle)
            }
        }
    }

    /// Deregister a listener. Removing the last listener for a key closes its
    /// upstream subscription. Returns false if the handle was not registered.
    pub fn remove_listener(&self, key: &K, handle: ListenerHandle) -> bool {
        let mut registry = self.shared.registry.lock();

        let Some(state) = registry.get_mut(key) else {
            return false;
        };
        let Some(index) = state.listeners.iter().position(|r| r.id == handle.id()) else {
            return false;
        };
        state.listeners.remove(index);

        if state.listeners.is_empty() {
            if let Some(state) = registry.remove(key) {
                // Closed under the lock so a concurrent first add cannot
                // reopen before this close lands.
                state.upstream.close();
                self.shared.metrics.upstream_closed();
                debug!(service = %self.shared.name, %key, "Upstream closed after last listener left");
            }
        } else {
            debug!(
                service = %self.shared.name,
                %key,
                listeners = state.listeners.len(),
                "Listener removed"
            );
        }
        true
    }

    /// Cache `value` for `key` and notify the listeners registered at call time.
    pub fn publish(&self, key: K, value: V) {
        self.shared.publish(key, value)
    }

    /// Last published value for `key`
    pub fn get(&self, key: &K) -> Result<V> {
        self.shared
            .cache
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PubSubError::NotFound(key.to_string()))
    }

    /// Populate the cache without notifying, unless a value is already cached.
    /// Used for read-through fills. Returns true if the value was stored.
    pub fn seed_if_absent(&self, key: K, value: V) -> bool {
        if self.shared.shut_down.load(Ordering::Acquire) {
            return false;
        }
        match self.shared.cache.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Start the underlying data source
    pub fn start(&self) -> Result<()> {
        self.shared.source.start()?;
        info!(service = %self.shared.name, "Service started");
        Ok(())
    }

    /// Close every upstream, drop all listeners and cached values, then shut
    /// the data source down. Later registrations fail with `ShutDown`.
    pub fn shutdown(&self) {
        let closed = {
            let mut registry = self.shared.registry.lock();
            if self.shared.shut_down.swap(true, Ordering::AcqRel) {
                return;
            }
            let closed = registry.len();
            for (_, state) in registry.drain() {
                state.upstream.close();
                self.shared.metrics.upstream_closed();
            }
            self.shared.cache.clear();
            closed
        };
        self.shared.source.shutdown();
        info!(service = %self.shared.name, upstreams_closed = closed, "Service shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Number of listeners registered for `key`
    pub fn listener_count(&self, key: &K) -> usize {
        self.shared
            .registry
            .lock()
            .get(key)
            .map(|state| state.listeners.len())
            .unwrap_or(0)
    }

    /// Whether an upstream subscription is open for `key`
    pub fn has_upstream(&self, key: &K) -> bool {
        self.shared.registry.lock().contains_key(key)
    }

    /// Keys that currently have at least one listener
    pub fn active_keys(&self) -> Vec<K> {
        self.shared.registry.lock().keys().cloned().collect()
    }

    /// Number of cached values
    pub fn cached_len(&self) -> usize {
        self.shared.cache.len()
    }
}

impl<K, V> std::fmt::Debug for PubSubService<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubService")
            .field("name", &self.shared.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Records opens and closes per key
    #[derive(Default)]
    struct RecordingSource {
        events: Mutex<Vec<(String, &'static str)>>,
    }

    impl RecordingSource {
        fn open_count(&self, key: &str) -> usize {
            self.count(key, "open")
        }

        fn close_count(&self, key: &str) -> usize {
            self.count(key, "close")
        }

        fn count(&self, key: &str, what: &str) -> usize {
            self.events
                .lock()
                .iter()
                .filter(|(k, e)| k == key && *e == what)
                .count()
        }
    }

    struct RecordingHandle(Arc<RecordingSource>);

    impl DataSource<String, u32> for RecordingHandle {
        fn open(&self, key: &String, _publisher: Publisher<String, u32>) -> Result<Box<dyn Upstream>> {
            self.0.events.lock().push((key.clone(), "open"));
            let source = Arc::clone(&self.0);
            let key = key.clone();
            Ok(Box::new(move || source.events.lock().push((key, "close"))))
        }
    }

    fn recording_service() -> (PubSubService<String, u32>, Arc<RecordingSource>) {
        let source = Arc::new(RecordingSource::default());
        let service = PubSubService::new("test", Arc::new(RecordingHandle(Arc::clone(&source))));
        (service, source)
    }

    fn collector() -> (Arc<dyn Listener<String, u32>>, Arc<Mutex<Vec<(String, u32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = Arc::new(move |k: &String, v: &u32| sink.lock().push((k.clone(), *v)));
        (listener, seen)
    }

    #[test]
    fn test_first_listener_opens_last_listener_closes() {
        let (service, source) = recording_service();
        let key = "ES".to_string();
        let (a, _) = collector();
        let (b, _) = collector();

        let ha = service.add_listener(key.clone(), a).unwrap();
        assert!(ha.opened_upstream());
        assert_eq!(source.open_count("ES"), 1);

        let hb = service.add_listener(key.clone(), b).unwrap();
        assert!(!hb.opened_upstream());
        assert_eq!(source.open_count("ES"), 1);
        assert_eq!(service.listener_count(&key), 2);

        assert!(service.remove_listener(&key, ha));
        assert!(service.has_upstream(&key));
        assert_eq!(source.close_count("ES"), 0);

        assert!(service.remove_listener(&key, hb));
        assert!(!service.has_upstream(&key));
        assert_eq!(source.close_count("ES"), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (service, source) = recording_service();
        let (a, _) = collector();
        let handle = service.add_listener("ES".to_string(), a).unwrap();

        assert!(service.remove_listener(&"ES".to_string(), handle));
        assert!(!service.remove_listener(&"ES".to_string(), handle));
        assert!(!service.remove_listener(&"NQ".to_string(), handle));
        assert_eq!(source.close_count("ES"), 1);
    }

    #[test]
    fn test_publish_updates_cache_and_notifies_once() {
        let (service, _) = recording_service();
        let (a, seen_a) = collector();
        let (b, seen_b) = collector();
        service.add_listener("ES".to_string(), a).unwrap();
        service.add_listener("ES".to_string(), b).unwrap();

        service.publish("ES".to_string(), 42);

        assert_eq!(service.get(&"ES".to_string()).unwrap(), 42);
        assert_eq!(*seen_a.lock(), vec![("ES".to_string(), 42)]);
        assert_eq!(*seen_b.lock(), vec![("ES".to_string(), 42)]);
    }

    #[test]
    fn test_publish_without_listeners_still_caches() {
        let service: PubSubService<String, u32> = PubSubService::passive("test");
        service.publish("NQ".to_string(), 7);
        assert_eq!(service.get(&"NQ".to_string()).unwrap(), 7);
        assert!(!service.has_upstream(&"NQ".to_string()));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let service: PubSubService<String, u32> = PubSubService::passive("test");
        assert_matches!(service.get(&"ES".to_string()), Err(PubSubError::NotFound(k)) if k == "ES");
    }

    #[test]
    fn test_other_keys_not_notified() {
        let (service, _) = recording_service();
        let (a, seen) = collector();
        service.add_listener("ES".to_string(), a).unwrap();
        service.publish("NQ".to_string(), 1);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let (service, _) = recording_service();
        let (before, seen_before) = collector();
        let (after, seen_after) = collector();
        let bad: Arc<dyn Listener<String, u32>> = Arc::new(|_: &String, _: &u32| panic!("boom"));

        service.add_listener("ES".to_string(), before).unwrap();
        service.add_listener("ES".to_string(), bad).unwrap();
        service.add_listener("ES".to_string(), after).unwrap();

        service.publish("ES".to_string(), 5);

        assert_eq!(seen_before.lock().len(), 1);
        assert_eq!(seen_after.lock().len(), 1);
        assert_eq!(service.get(&"ES".to_string()).unwrap(), 5);
    }

    #[test]
    fn test_double_subscribe_notifies_twice() {
        let (service, _) = recording_service();
        let (a, seen) = collector();
        let h1 = service.add_listener("ES".to_string(), Arc::clone(&a)).unwrap();
        let h2 = service.add_listener("ES".to_string(), a).unwrap();
        assert_ne!(h1, h2);

        service.publish("ES".to_string(), 1);
        assert_eq!(seen.lock().len(), 2);

        service.remove_listener(&"ES".to_string(), h1);
        service.publish("ES".to_string(), 2);
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_listener_may_reenter_service() {
        let (service, source) = recording_service();
        let slot: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let svc = service.clone();
        let own = Arc::clone(&slot);
        let counter = Arc::clone(&calls);
        let listener: Arc<dyn Listener<String, u32>> = Arc::new(move |k: &String, _: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = own.lock().take() {
                svc.remove_listener(k, handle);
            }
        });

        let handle = service.add_listener("ES".to_string(), listener).unwrap();
        *slot.lock() = Some(handle);

        service.publish("ES".to_string(), 1);
        service.publish("ES".to_string(), 2);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!service.has_upstream(&"ES".to_string()));
        assert_eq!(source.close_count("ES"), 1);
    }

    struct ThreadedSource;

    impl DataSource<String, u32> for ThreadedSource {
        fn open(&self, key: &String, publisher: Publisher<String, u32>) -> Result<Box<dyn Upstream>> {
            let key = key.clone();
            std::thread::spawn(move || {
                publisher.publish(key, 99);
            });
            Ok(Box::new(|| {}))
        }
    }

    #[test]
    fn test_source_publishes_from_another_thread() {
        let service = PubSubService::new("threaded", Arc::new(ThreadedSource));
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let listener: Arc<dyn Listener<String, u32>> = Arc::new(move |k: &String, v: &u32| {
            let _ = tx.lock().send((k.clone(), *v));
        });

        service.add_listener("ES".to_string(), listener).unwrap();
        let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(received, ("ES".to_string(), 99));
    }

    #[test]
    fn test_publisher_after_drop_returns_false() {
        let service: PubSubService<String, u32> = PubSubService::passive("test");
        let publisher = Publisher::new(Arc::downgrade(&service.shared));
        assert!(publisher.publish("ES".to_string(), 1));
        drop(service);
        assert!(!publisher.publish("ES".to_string(), 2));
    }

    struct RefusingSource;

    impl DataSource<String, u32> for RefusingSource {
        fn open(&self, key: &String, _publisher: Publisher<String, u32>) -> Result<Box<dyn Upstream>> {
            Err(PubSubError::upstream(key, "feed unavailable"))
        }
    }

    #[test]
    fn test_failed_open_registers_nothing() {
        let service = PubSubService::new("refusing", Arc::new(RefusingSource));
        let (a, _) = collector();
        let result = service.add_listener("ES".to_string(), a);

        assert_matches!(result, Err(PubSubError::Upstream { .. }));
        assert_eq!(service.listener_count(&"ES".to_string()), 0);
        assert!(!service.has_upstream(&"ES".to_string()));
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let (service, source) = recording_service();
        let (a, seen) = collector();
        service.add_listener("ES".to_string(), Arc::clone(&a)).unwrap();
        service.add_listener("NQ".to_string(), Arc::clone(&a)).unwrap();
        service.publish("ES".to_string(), 1);

        service.shutdown();

        assert!(service.is_shut_down());
        assert_eq!(source.close_count("ES"), 1);
        assert_eq!(source.close_count("NQ"), 1);
        assert!(service.active_keys().is_empty());
        assert_eq!(service.cached_len(), 0);

        service.publish("ES".to_string(), 2);
        assert_eq!(seen.lock().len(), 1);
        assert_matches!(service.get(&"ES".to_string()), Err(PubSubError::NotFound(_)));
        assert_matches!(
            service.add_listener("ES".to_string(), a),
            Err(PubSubError::ShutDown(_))
        );

        // second shutdown is a no-op
        service.shutdown();
        assert_eq!(source.close_count("ES"), 1);
    }

    #[test]
    fn test_seed_if_absent_does_not_override_or_notify() {
        let (service, _) = recording_service();
        let (a, seen) = collector();
        service.add_listener("ES".to_string(), a).unwrap();

        assert!(service.seed_if_absent("ES".to_string(), 10));
        assert!(!service.seed_if_absent("ES".to_string(), 11));
        assert_eq!(service.get(&"ES".to_string()).unwrap(), 10);
        assert!(seen.lock().is_empty());

        service.publish("ES".to_string(), 12);
        assert!(!service.seed_if_absent("ES".to_string(), 13));
        assert_eq!(service.get(&"ES".to_string()).unwrap(), 12);
    }

    #[test]
    fn test_single_key_order_preserved() {
        let (service, _) = recording_service();
        let (a, seen) = collector();
        service.add_listener("ES".to_string(), a).unwrap();

        let publisher = service.clone();
        std::thread::spawn(move || {
            for i in 0..500 {
                publisher.publish("ES".to_string(), i);
            }
        })
        .join()
        .unwrap();

        let values: Vec<u32> = seen.lock().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, (0..500).collect::<Vec<_>>());
    }

    #[test]
    fn test_concurrent_keys() {
        let (service, _) = recording_service();
        let total = Arc::new(AtomicUsize::new(0));
        let keys: Vec<String> = (0..4).map(|i| format!("K{}", i)).collect();
        for key in &keys {
            let counter = Arc::clone(&total);
            let listener: Arc<dyn Listener<String, u32>> = Arc::new(move |_: &String, _: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            service.add_listener(key.clone(), listener).unwrap();
        }

        let threads: Vec<_> = keys
            .iter()
            .cloned()
            .map(|key| {
                let svc = service.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        svc.publish(key.clone(), i);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(total.load(Ordering::SeqCst), 1000);
        for key in &keys {
            assert_eq!(service.get(key).unwrap(), 249);
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..3).prop_map(Op::Add),
            (0usize..16).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_upstream_exists_iff_listeners(ops in proptest::collection::vec(op(), 1..60)) {
            let (service, source) = recording_service();
            let mut handles: Vec<(String, ListenerHandle)> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(k) => {
                        let key = format!("K{}", k);
                        let (listener, _) = collector();
                        let handle = service.add_listener(key.clone(), listener).unwrap();
                        handles.push((key, handle));
                    }
                    Op::Remove(i) => {
                        if !handles.is_empty() {
                            let (key, handle) = handles.remove(i % handles.len());
                            prop_assert!(service.remove_listener(&key, handle));
                        }
                    }
                }

                for k in 0..3 {
                    let key = format!("K{}", k);
                    let listeners = service.listener_count(&key);
                    let open = source.open_count(&key) - source.close_count(&key);
                    prop_assert_eq!(service.has_upstream(&key), listeners > 0);
                    prop_assert_eq!(open, usize::from(listeners > 0));
                }
            }
        }
    }
}
