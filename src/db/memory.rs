use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use super::OrderStore;
use crate::domain::order::{Order, OrderError, OrderStatus, TransitionCheck};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Applies the same check-then-write transition semantics as the Postgres
// store, with a mutex standing in for the transaction: each operation
// observes and mutates the map atomically. Used by unit tests and local
// development; also counts actual status writes so tests can assert that
// idempotent replays do not touch storage.
//
// ============================================================================

#[derive(Default)]
struct Inner {
    next_id: i64,
    orders: HashMap<i64, Order>,
    status_writes: u64,
}

#[derive(Default)]
pub struct MemoryOrderStore {
    // No await happens while the lock is held.
    inner: Mutex<Inner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an order directly at the given status, bypassing transition
    /// rules. Test seeding only.
    pub fn seed_order(&self, user_id: &str, amount: Decimal, status: OrderStatus) -> Order {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let now = Utc::now();
        let order = Order {
            id: inner.next_id,
            user_id: user_id.to_string(),
            status,
            amount,
            message: None,
            created_at: now,
            updated_at: now,
        };
        inner.orders.insert(order.id, order.clone());
        order
    }

    /// Number of times a status was actually written (idempotent no-ops and
    /// rejected transitions do not count).
    pub fn status_write_count(&self) -> u64 {
        self.inner.lock().unwrap().status_writes
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, user_id: &str, amount: Decimal) -> Result<Order, OrderError> {
        Ok(self.seed_order(user_id, amount, OrderStatus::Created))
    }

    async fn get_order(&self, id: i64) -> Result<Order, OrderError> {
        self.inner
            .lock()
            .unwrap()
            .orders
            .get(&id)
            .cloned()
            .ok_or(OrderError::NotFound(id))
    }

    async fn transition_status(
        &self,
        id: i64,
        expected_current: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<i64, OrderError> {
        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .orders
            .get(&id)
            .map(|order| order.status)
            .ok_or(OrderError::NotFound(id))?;

        match OrderStatus::check_transition(current, expected_current, new_status) {
            TransitionCheck::AlreadyApplied => Ok(id),
            TransitionCheck::Mismatch => Err(OrderError::InvalidTransition {
                id,
                current,
                expected: expected_current,
                requested: new_status,
            }),
            TransitionCheck::Apply => {
                if let Some(order) = inner.orders.get_mut(&id) {
                    order.status = new_status;
                    order.updated_at = Utc::now();
                }
                inner.status_writes += 1;
                Ok(id)
            }
        }
    }
}

// ============================================================================
// Unit Tests - transition engine semantics
// ============================================================================
