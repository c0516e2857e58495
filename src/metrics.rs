//! Prometheus-style metrics: a request counter, an in-flight gauge, and the
//! `/metrics` scrape surface served on its own listener by [`crate::handler`].

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    requests_in_flight: IntGauge,
}

static METRICS: Lazy<Metrics> = Lazy::new(Metrics::build);

impl Metrics {
    /// The process-wide metrics registry. A single `Lazy` instance because
    /// the scrape endpoint and the handler that records completions must
    /// share one set of counters.
    pub fn global() -> &'static Metrics {
        &METRICS
    }

    fn build() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests processed"),
            &["code", "method"],
        )
        .expect("metric names and label names are valid");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("first and only registration of http_requests_total");

        let requests_in_flight = IntGauge::new(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
        )
        .expect("metric name is valid");
        registry
            .register(Box::new(requests_in_flight.clone()))
            .expect("first and only registration of http_requests_in_flight");

        Self {
            registry,
            requests_total,
            requests_in_flight,
        }
    }

    pub fn record_completion(&self, method: &str, status_code: u16) {
        self.requests_total
            .with_label_values(&[&status_code.to_string(), method])
            .inc();
    }

    pub fn inc_in_flight(&self) {
        self.requests_in_flight.inc();
    }

    pub fn dec_in_flight(&self) {
        self.requests_in_flight.dec();
    }

    /// Renders every registered metric in the Prometheus text exposition
    /// format, for the `GET /metrics` handler.
    pub fn render(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .expect("text encoding of gathered metric families cannot fail");
        buffer
    }
}
