use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Tracks the reconciliation pipeline end to end:
// - order creation and order_created publication outcomes
// - stock event consumption (per kind, per handling outcome, latency)
// - catalog degradation on the enrichment path
// - publish circuit breaker state
//
// Scraped via the /metrics endpoint on the HTTP server.
// ============================================================================

/// Central metrics registry for the service
pub struct Metrics {
    registry: Registry,

    // Creation / publish path
    pub orders_created: IntCounter,
    pub order_events_published: IntCounter,
    pub order_event_publish_failures: IntCounterVec,

    // Stock event consumption
    pub stock_events_consumed: IntCounterVec,
    pub stock_event_outcomes: IntCounterVec,
    pub stock_event_handling_duration: HistogramVec,

    // Enrichment path
    pub catalog_fetch_failures: IntCounterVec,

    // Publish circuit breaker
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_events_published = IntCounter::new(
            "order_events_published_total",
            "Total order_created events published",
        )?;
        registry.register(Box::new(order_events_published.clone()))?;

        let order_event_publish_failures = IntCounterVec::new(
            Opts::new(
                "order_event_publish_failures_total",
                "order_created events that could not be published",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(order_event_publish_failures.clone()))?;

        let stock_events_consumed = IntCounterVec::new(
            Opts::new("stock_events_consumed_total", "Stock events pulled from the queue"),
            &["event"],
        )?;
        registry.register(Box::new(stock_events_consumed.clone()))?;

        let stock_event_outcomes = IntCounterVec::new(
            Opts::new(
                "stock_event_outcomes_total",
                "Handling outcome per consumed stock event",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(stock_event_outcomes.clone()))?;

        let stock_event_handling_duration = HistogramVec::new(
            HistogramOpts::new(
                "stock_event_handling_duration_seconds",
                "Stock event handling duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event"],
        )?;
        registry.register(Box::new(stock_event_handling_duration.clone()))?;

        let catalog_fetch_failures = IntCounterVec::new(
            Opts::new(
                "catalog_fetch_failures_total",
                "Catalog fetches that degraded to an empty snapshot",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(catalog_fetch_failures.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "publish_circuit_breaker_state",
            "Publish circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_events_published,
            order_event_publish_failures,
            stock_events_consumed,
            stock_event_outcomes,
            stock_event_handling_duration,
            catalog_fetch_failures,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_publish_failure(&self, reason: &str) {
        self.order_event_publish_failures
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_stock_event(&self, event: &str, outcome: &str, duration_secs: f64) {
        self.stock_events_consumed.with_label_values(&[event]).inc();
        self.stock_event_outcomes
            .with_label_values(&[outcome])
            .inc();
        self.stock_event_handling_duration
            .with_label_values(&[event])
            .observe(duration_secs);
    }

    pub fn record_catalog_failure(&self, reason: &str) {
        self.catalog_fetch_failures
            .with_label_values(&[reason])
            .inc();
    }

    /// 0=Closed, 1=Open, 2=HalfOpen
    pub fn update_circuit_breaker_state(&self, state: u8) {
        self.circuit_breaker_state.set(state as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_stock_event() {
        let metrics = Metrics::new().unwrap();
        metrics.record_stock_event("stock_validated", "applied", 0.02);

        let gathered = metrics.registry.gather();
        let consumed = gathered
            .iter()
            .find(|m| m.name() == "stock_events_consumed_total")
            .unwrap();
        assert_eq!(consumed.metric[0].counter.value, Some(1.0));

        let outcomes = gathered
            .iter()
            .find(|m| m.name() == "stock_event_outcomes_total")
            .unwrap();
        assert_eq!(outcomes.metric[0].counter.value, Some(1.0));
    }

    #[test]
    fn test_record_publish_failure() {
        let metrics = Metrics::new().unwrap();
        metrics.record_publish_failure("no_channel");
        metrics.record_publish_failure("no_channel");

        let gathered = metrics.registry.gather();
        let failures = gathered
            .iter()
            .find(|m| m.name() == "order_event_publish_failures_total")
            .unwrap();
        assert_eq!(failures.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(1);

        let gathered = metrics.registry.gather();
        let state = gathered
            .iter()
            .find(|m| m.name() == "publish_circuit_breaker_state")
            .unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(1.0));
    }
}
