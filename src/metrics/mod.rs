// Private module declaration
mod server;

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Consumer/handler failures never abort the loop and are not returned to
// any caller, so these counters (plus the logs) are the only place they
// are observable.
//
// ============================================================================

/// Central metrics registry for the worker.
pub struct Metrics {
    registry: Registry,

    // Consumer loop
    pub events_consumed: IntCounter,
    pub batches_flushed: IntCounter,

    // Checkout handler outcomes
    pub checkout_events_processed: IntCounter,
    pub checkout_events_failed: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_consumed = IntCounter::new(
            "events_consumed_total",
            "Total stream events pulled into the batch buffer",
        )?;
        registry.register(Box::new(events_consumed.clone()))?;

        let batches_flushed = IntCounter::new(
            "batches_flushed_total",
            "Total batch flushes (size, timeout and shutdown triggered)",
        )?;
        registry.register(Box::new(batches_flushed.clone()))?;

        let checkout_events_processed = IntCounter::new(
            "checkout_events_processed_total",
            "Checkout status events that resulted in an order transition",
        )?;
        registry.register(Box::new(checkout_events_processed.clone()))?;

        let checkout_events_failed = IntCounterVec::new(
            Opts::new(
                "checkout_events_failed_total",
                "Checkout status events dropped without a transition",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(checkout_events_failed.clone()))?;

        Ok(Self {
            registry,
            events_consumed,
            batches_flushed,
            checkout_events_processed,
            checkout_events_failed,
        })
    }

    /// The Prometheus registry backing the scrape endpoint.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_checkout_failure(&self, reason: &str) {
        self.checkout_events_failed.with_label_values(&[reason]).inc();
    }
}
