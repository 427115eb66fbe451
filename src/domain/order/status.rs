use serde::{Deserialize, Serialize};

// ============================================================================
// Order Status - Saga State Machine Values
// ============================================================================

/// Closed set of order states under saga control.
///
/// The first five are in active use; `AwaitingShipment`, `AwaitingPickup`
/// and `Completed` are reserved for the later fulfillment stages of the
/// saga and are not yet produced by any handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    PendingPayment,
    AwaitingFulfillment,
    AwaitingShipment,
    AwaitingPickup,
    Completed,
    Cancelled,
    Failed,
}

/// Outcome of validating a requested transition against the actual state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// Actual status already equals the target: succeed without writing.
    AlreadyApplied,
    /// Actual status matches the expectation: perform the write.
    Apply,
    /// Actual status matches neither: reject the request.
    Mismatch,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Created,
        OrderStatus::PendingPayment,
        OrderStatus::AwaitingFulfillment,
        OrderStatus::AwaitingShipment,
        OrderStatus::AwaitingPickup,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::AwaitingFulfillment => "awaiting_fulfillment",
            OrderStatus::AwaitingShipment => "awaiting_shipment",
            OrderStatus::AwaitingPickup => "awaiting_pickup",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }

    /// Parse a status name against the closed set. Anything outside it is
    /// invalid, there is no fallback value.
    pub fn parse(s: &str) -> Option<OrderStatus> {
        OrderStatus::ALL.iter().copied().find(|status| status.as_str() == s)
    }

    /// Validate a transition request against the actual current status.
    ///
    /// A request names the status it expects the order to be in and the
    /// status it wants to move to. It may proceed when the expectation
    /// holds, and it counts as already done when the order is at the target
    /// status, which makes every transition safe to retry or to race.
    /// The already-at-target check runs first so a replayed request never
    /// trips the expectation check.
    pub fn check_transition(
        current: OrderStatus,
        expected_current: OrderStatus,
        new_status: OrderStatus,
    ) -> TransitionCheck {
        if current == new_status {
            TransitionCheck::AlreadyApplied
        } else if current == expected_current {
            TransitionCheck::Apply
        } else {
            TransitionCheck::Mismatch
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
