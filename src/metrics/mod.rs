/*!
 * # Metrics Module
 *
 * In-process counters and histograms exported in Prometheus text format at
 * `/metrics`.
 *
 * - HTTP request counts and latency by status class
 * - Order lifecycle counters
 * - Payment ledger and reconciliation counters (checkouts, confirmations by
 *   source, webhook rejections, poll timeouts, double payments)
 */

use axum::{extract::Request, middleware::Next, response::Response};
use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ConfirmationSource;

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Count and sum only; the sum is kept in microseconds so sub-second
/// latencies survive integer storage.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_micros: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, duration: Duration) {
        self.sum_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum_seconds(&self) -> f64 {
        self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Renders every metric in Prometheus text exposition format, sorted by name.
    pub fn export_metrics(&self) -> String {
        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect();
        counters.sort();

        let mut histograms: Vec<(String, u64, f64)> = self
            .histograms
            .iter()
            .map(|entry| {
                let h = entry.value();
                (entry.key().clone(), h.get_count(), h.get_sum_seconds())
            })
            .collect();
        histograms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut output = String::new();
        for (name, value) in counters {
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }
        for (name, count, sum) in histograms {
            let _ = writeln!(output, "# TYPE {name} histogram");
            let _ = writeln!(output, "{name}_count {count}");
            let _ = writeln!(output, "{name}_sum {sum}");
        }
        output
    }
}

lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub struct HttpMetrics {
    pub requests_total: Counter,
    pub request_duration: Histogram,
    pub status_2xx: Counter,
    pub status_4xx: Counter,
    pub status_5xx: Counter,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: METRICS.get_or_create_counter("http_requests_total"),
            request_duration: METRICS.get_or_create_histogram("http_request_duration_seconds"),
            status_2xx: METRICS.get_or_create_counter("http_status_2xx_total"),
            status_4xx: METRICS.get_or_create_counter("http_status_4xx_total"),
            status_5xx: METRICS.get_or_create_counter("http_status_5xx_total"),
        }
    }

    pub fn record_request(&self, duration: Duration, status_code: u16) {
        self.requests_total.inc();
        self.request_duration.observe(duration);

        match status_code {
            200..=299 => self.status_2xx.inc(),
            400..=499 => self.status_4xx.inc(),
            500..=599 => self.status_5xx.inc(),
            _ => {}
        }
    }
}

pub struct OrderMetrics {
    pub orders_created: Counter,
    pub orders_cancelled: Counter,
    pub orders_delivered: Counter,
    pub status_conflicts: Counter,
}

impl OrderMetrics {
    pub fn new() -> Self {
        Self {
            orders_created: METRICS.get_or_create_counter("orders_created_total"),
            orders_cancelled: METRICS.get_or_create_counter("orders_cancelled_total"),
            orders_delivered: METRICS.get_or_create_counter("orders_delivered_total"),
            status_conflicts: METRICS.get_or_create_counter("order_status_conflicts_total"),
        }
    }
}

pub struct PaymentMetrics {
    pub checkouts_created: Counter,
    pub checkouts_reused: Counter,
    pub confirmed_by_webhook: Counter,
    pub confirmed_by_poll: Counter,
    pub confirmed_cash: Counter,
    pub already_confirmed: Counter,
    pub attempts_failed: Counter,
    pub webhooks_rejected: Counter,
    pub webhooks_duplicate: Counter,
    pub poll_timeouts: Counter,
    pub double_payments: Counter,
    pub provider_errors: Counter,
}

impl PaymentMetrics {
    pub fn new() -> Self {
        Self {
            checkouts_created: METRICS.get_or_create_counter("payment_checkouts_created_total"),
            checkouts_reused: METRICS.get_or_create_counter("payment_checkouts_reused_total"),
            confirmed_by_webhook: METRICS
                .get_or_create_counter("payment_confirmations_webhook_total"),
            confirmed_by_poll: METRICS.get_or_create_counter("payment_confirmations_poll_total"),
            confirmed_cash: METRICS.get_or_create_counter("payment_confirmations_cash_total"),
            already_confirmed: METRICS
                .get_or_create_counter("payment_confirmations_duplicate_total"),
            attempts_failed: METRICS.get_or_create_counter("payment_attempts_failed_total"),
            webhooks_rejected: METRICS.get_or_create_counter("payment_webhooks_rejected_total"),
            webhooks_duplicate: METRICS.get_or_create_counter("payment_webhooks_duplicate_total"),
            poll_timeouts: METRICS.get_or_create_counter("payment_poll_timeouts_total"),
            double_payments: METRICS.get_or_create_counter("payment_double_payments_total"),
            provider_errors: METRICS.get_or_create_counter("payment_provider_errors_total"),
        }
    }

    pub fn record_confirmation(&self, source: ConfirmationSource) {
        match source {
            ConfirmationSource::Webhook => self.confirmed_by_webhook.inc(),
            ConfirmationSource::Poll => self.confirmed_by_poll.inc(),
            ConfirmationSource::Cash => self.confirmed_cash.inc(),
        }
    }
}

lazy_static::lazy_static! {
    pub static ref HTTP_METRICS: HttpMetrics = HttpMetrics::new();
    pub static ref ORDER_METRICS: OrderMetrics = OrderMetrics::new();
    pub static ref PAYMENT_METRICS: PaymentMetrics = PaymentMetrics::new();
}

/// Records count and latency of every request passing through the router.
pub async fn track_http_metrics(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;
    HTTP_METRICS.record_request(started.elapsed(), response.status().as_u16());
    response
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler() -> String {
    METRICS.export_metrics()
}
