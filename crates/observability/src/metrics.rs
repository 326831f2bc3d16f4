//! Prometheus metrics infrastructure
//!
//! Each pub-sub service instance owns a [`ServiceMetrics`] handle labelled
//! with its name, so market data and risk show up as separate series.

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Initialize the Prometheus metrics exporter
///
/// Starts an HTTP listener exposing `/metrics` on the given port.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    tracing::info!(%addr, "Metrics server listening");
    Ok(())
}

/// Metrics for one keyed pub-sub service
///
/// # Metrics
///
/// * `pubsub_publishes_total` - values published
/// * `pubsub_notifications_total` - listener invocations
/// * `pubsub_listener_errors_total` - listener invocations that panicked
/// * `pubsub_upstream_opened_total` / `pubsub_upstream_closed_total`
/// * `pubsub_active_upstreams` - upstream subscriptions currently open
/// * `pubsub_notify_duration_seconds` - time spent notifying per publish
///
/// Without an installed recorder every call is a no-op.
#[derive(Clone)]
pub struct ServiceMetrics {
    publishes: Counter,
    notifications: Counter,
    listener_errors: Counter,
    upstream_opened: Counter,
    upstream_closed: Counter,
    active_upstreams: Gauge,
    notify_duration: Histogram,
    service_name: String,
}

impl ServiceMetrics {
    /// Create metrics for a named service (e.g. "market-data", "risk")
    pub fn new(service_name: &str) -> Self {
        let name = service_name.to_string();

        Self {
            publishes: counter!("pubsub_publishes_total", "service" => name.clone()),
            notifications: counter!("pubsub_notifications_total", "service" => name.clone()),
            listener_errors: counter!("pubsub_listener_errors_total", "service" => name.clone()),
            upstream_opened: counter!("pubsub_upstream_opened_total", "service" => name.clone()),
            upstream_closed: counter!("pubsub_upstream_closed_total", "service" => name.clone()),
            active_upstreams: gauge!("pubsub_active_upstreams", "service" => name.clone()),
            notify_duration: histogram!("pubsub_notify_duration_seconds", "service" => name.clone()),
            service_name: name,
        }
    }

    /// Record one publish that notified `listeners` listeners
    pub fn record_publish(&self, listeners: usize, duration: Duration) {
        self.publishes.increment(1);
        self.notifications.increment(listeners as u64);
        self.notify_duration.record(duration.as_secs_f64());
    }

    pub fn listener_failed(&self) {
        self.listener_errors.increment(1);
    }

    pub fn upstream_opened(&self) {
        self.upstream_opened.increment(1);
        self.active_upstreams.increment(1.0);
    }

    pub fn upstream_closed(&self) {
        self.upstream_closed.increment(1);
        self.active_upstreams.decrement(1.0);
    }

    /// Get the service name
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics")
            .field("service_name", &self.service_name)
            .finish()
    }
}
