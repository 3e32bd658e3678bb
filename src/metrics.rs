//! # Prometheus Metrics — Economy and Gateway Exposition
//!
//! Exposes orbit-tap operational metrics in the Prometheus text exposition
//! format for scraping by Prometheus or any OpenMetrics-compatible collector.
//!
//! ## Metrics Exposed
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `orbit_tap_points_awarded_total` | Counter | `source` | Points credited |
//! | `orbit_tap_points_spent_total` | Counter | `reason` | Points debited by purchases |
//! | `orbit_tap_accounts_created_total` | Counter | — | New accounts |
//! | `orbit_tap_push_connections` | Gauge | — | Registered push channels |
//! | `orbit_tap_push_delivered_total` | Counter | — | Push messages delivered |
//! | `orbit_tap_http_request_duration_seconds` | Histogram | `method`, `path` | Request latency |
//!
//! The `/metrics` endpoint renders the current registry state on each scrape.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct SourceLabel {
    pub source: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct ReasonLabel {
    pub reason: String,
}

/// Label set for HTTP latency. `path` is normalized (ids collapsed).
#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct HttpLabel {
    pub method: String,
    pub path: String,
}

/// Thread-safe metrics registry. All fields are atomic and safe to update
/// from any task.
pub struct Metrics {
    pub registry: Registry,
    pub points_awarded: Family<SourceLabel, Counter<f64, AtomicU64>>,
    pub points_spent: Family<ReasonLabel, Counter<f64, AtomicU64>>,
    pub accounts_created: Counter,
    pub push_connections: Gauge,
    pub push_delivered: Counter,
    pub http_request_duration: Family<HttpLabel, Histogram>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let points_awarded = Family::<SourceLabel, Counter<f64, AtomicU64>>::default();
        registry.register(
            "orbit_tap_points_awarded",
            "Points credited to accounts by source",
            points_awarded.clone(),
        );

        let points_spent = Family::<ReasonLabel, Counter<f64, AtomicU64>>::default();
        registry.register(
            "orbit_tap_points_spent",
            "Points spent by accounts by purchase reason",
            points_spent.clone(),
        );

        let accounts_created = Counter::default();
        registry.register(
            "orbit_tap_accounts_created",
            "Accounts created on first authentication",
            accounts_created.clone(),
        );

        let push_connections = Gauge::default();
        registry.register(
            "orbit_tap_push_connections",
            "Number of registered push channels",
            push_connections.clone(),
        );

        let push_delivered = Counter::default();
        registry.register(
            "orbit_tap_push_delivered",
            "Push messages delivered to a live channel",
            push_delivered.clone(),
        );

        let http_request_duration = Family::<HttpLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 14))
        });
        registry.register(
            "orbit_tap_http_request_duration_seconds",
            "HTTP request latency",
            http_request_duration.clone(),
        );

        Self {
            registry,
            points_awarded,
            points_spent,
            accounts_created,
            push_connections,
            push_delivered,
            http_request_duration,
        }
    }

    pub fn record_award(&self, source: &str, amount: f64) {
        self.points_awarded
            .get_or_create(&SourceLabel {
                source: source.to_string(),
            })
            .inc_by(amount);
    }

    pub fn record_spend(&self, reason: &str, amount: f64) {
        if amount > 0.0 {
            self.points_spent
                .get_or_create(&ReasonLabel {
                    reason: reason.to_string(),
                })
                .inc_by(amount);
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::warn!(error = %e, "failed to encode metrics");
        }
        buf
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
