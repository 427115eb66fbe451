// ============================================================================
// Storage Layer - Transactional Order Store
// ============================================================================
//
// The transition engine behind a trait seam so the worker and the message
// handlers depend on the contract, not on Postgres:
// - postgres: the real store (sqlx, REPEATABLE READ transactions)
// - memory:   an in-process store with the same semantics, used by unit
//             tests and local development
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::order::{Order, OrderError, OrderStatus};

/// Storage collaborator consumed by the core: order rows plus the sole
/// status-mutation primitive.
///
/// `transition_status` is deliberately the only way to change a status.
/// It validates the caller's expectation against the actual row inside one
/// transaction, and treats "already at the target status" as success, so
/// the same request can be retried, replayed from the stream, or raced by
/// concurrent callers without a separate deduplication layer.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order with status `Created`. No transition rules apply.
    async fn create_order(&self, user_id: &str, amount: Decimal) -> Result<Order, OrderError>;

    async fn get_order(&self, id: i64) -> Result<Order, OrderError>;

    /// Validate and update the status of an order.
    ///
    /// The current status is checked first to make sure the order is in an
    /// accepted state before making the change:
    /// - already at `new_status`: commit with no write, return the id
    /// - at `expected_current`: write `new_status`, commit, return the id
    /// - anything else: roll back, `InvalidTransition`
    async fn transition_status(
        &self,
        id: i64,
        expected_current: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<i64, OrderError>;

    /// Only a newly created order can be cancelled.
    async fn cancel_order(&self, id: i64) -> Result<i64, OrderError> {
        self.transition_status(id, OrderStatus::Created, OrderStatus::Cancelled)
            .await
    }
}
