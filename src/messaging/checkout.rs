use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::registry::MessageHandler;
use super::stream::Envelope;
use crate::db::OrderStore;
use crate::domain::order::OrderStatus;
use crate::metrics::Metrics;

// ============================================================================
// Checkout Event Handler
// ============================================================================
//
// Consumes checkout status events and advances the order saga accordingly.
// Every failure here is logged, counted and swallowed: the accumulator
// commits the offset either way, so a bad event is dropped rather than
// wedging the consumer (there is no retry or dead-letter path).
//
// ============================================================================

pub const CHECKOUT_STATUS_TOPIC: &str = "checkout-status";

pub const CHECKOUT_STATUS_FINALIZED: &str = "finalized";
pub const CHECKOUT_STATUS_FAILED: &str = "failed";

/// Wire format published by the checkout service.
#[derive(Debug, Deserialize)]
pub struct CheckoutMessage {
    #[serde(rename = "OrderId")]
    pub order_id: String,
    #[serde(rename = "Status")]
    pub status: String,
}

pub struct CheckoutHandler {
    store: Arc<dyn OrderStore>,
    metrics: Arc<Metrics>,
}

impl CheckoutHandler {
    pub fn new(store: Arc<dyn OrderStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }
}

#[async_trait]
impl MessageHandler for CheckoutHandler {
    async fn handle(&self, envelope: &Envelope) {
        tracing::info!(
            topic = %envelope.topic,
            message = %String::from_utf8_lossy(&envelope.payload),
            "handling checkout status event"
        );

        let message: CheckoutMessage = match serde_json::from_slice(&envelope.payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(
                    message = %String::from_utf8_lossy(&envelope.payload),
                    error = %err,
                    "failed to parse checkout message"
                );
                self.metrics.record_checkout_failure("decode");
                return;
            }
        };

        let order_id: i64 = match message.order_id.parse() {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(
                    order_id = %message.order_id,
                    error = %err,
                    "failed to parse order id in checkout message"
                );
                self.metrics.record_checkout_failure("decode");
                return;
            }
        };

        let order = match self.store.get_order(order_id).await {
            Ok(order) => order,
            Err(err) => {
                tracing::error!(order_id, error = %err, "failed to load order");
                self.metrics.record_checkout_failure("order_lookup");
                return;
            }
        };

        let target = match message.status.as_str() {
            CHECKOUT_STATUS_FINALIZED => OrderStatus::AwaitingFulfillment,
            CHECKOUT_STATUS_FAILED => OrderStatus::Failed,
            other => {
                tracing::error!(order_id, status = %other, "invalid checkout status");
                self.metrics.record_checkout_failure("invalid_status");
                return;
            }
        };

        // Already at the target: skip the transaction entirely. The engine
        // would treat this as an idempotent success anyway; checking here
        // saves a round trip on replays.
        if order.status == target {
            tracing::info!(order_id, status = %target, "order is up to date");
            return;
        }

        match self
            .store
            .transition_status(order_id, order.status, target)
            .await
        {
            Ok(_) => {
                tracing::info!(order_id, new_status = %target, "order status changed");
                self.metrics.checkout_events_processed.inc();
            }
            Err(err) => {
                tracing::error!(order_id, error = %err, "failed to change order status");
                self.metrics.record_checkout_failure("transition");
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
