use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::OrderStore;
use crate::domain::order::{Order, OrderError, OrderStatus, TransitionCheck};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// Expects an `orders` table with columns
// (id BIGSERIAL, user_id TEXT, status order_status, amount NUMERIC,
//  message TEXT NULL, created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)
// and the `order_status` enum type. Schema migration is owned by the
// deployment, not by this service.
//
// ============================================================================

const SELECT_ORDER: &str =
    "SELECT id, user_id, status, amount, message, created_at, updated_at \
     FROM orders WHERE id = $1";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, OrderError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Body of the transition transaction. The row is read through the
    /// transaction's own connection; reading through the pool here would
    /// block against our own uncommitted transaction.
    async fn transition_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: i64,
        expected_current: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<(), OrderError> {
        let order = sqlx::query_as::<_, Order>(SELECT_ORDER)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(OrderError::NotFound(id))?;

        match OrderStatus::check_transition(order.status, expected_current, new_status) {
            // already updated, no further action needed
            TransitionCheck::AlreadyApplied => Ok(()),
            TransitionCheck::Mismatch => {
                tracing::error!(
                    order_id = id,
                    current_status = %order.status,
                    expected_current_status = %expected_current,
                    new_status = %new_status,
                    "order is not in the expected status"
                );
                Err(OrderError::InvalidTransition {
                    id,
                    current: order.status,
                    expected: expected_current,
                    requested: new_status,
                })
            }
            TransitionCheck::Apply => {
                sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
                    .bind(new_status)
                    .bind(id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|err| {
                        tracing::error!(
                            order_id = id,
                            current_status = %order.status,
                            new_status = %new_status,
                            error = %err,
                            "failed to update order status"
                        );
                        OrderError::Storage(err)
                    })?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(&self, user_id: &str, amount: Decimal) -> Result<Order, OrderError> {
        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (user_id, status, amount) VALUES ($1, $2, $3) \
             RETURNING id, user_id, status, amount, message, created_at, updated_at",
        )
        .bind(user_id)
        .bind(OrderStatus::Created)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(order_id = order.id, user_id = %order.user_id, "order created");
        Ok(order)
    }

    async fn get_order(&self, id: i64) -> Result<Order, OrderError> {
        sqlx::query_as::<_, Order>(SELECT_ORDER)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(OrderError::NotFound(id))
    }

    async fn transition_status(
        &self,
        id: i64,
        expected_current: OrderStatus,
        new_status: OrderStatus,
    ) -> Result<i64, OrderError> {
        let mut tx = self.pool.begin().await?;

        // REPEATABLE READ keeps a concurrent writer's half-finished change
        // invisible to this transaction; the check-then-write below is only
        // sound under that isolation level or stronger.
        let result = match sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await
        {
            Ok(_) => Self::transition_in_tx(&mut tx, id, expected_current, new_status).await,
            Err(err) => Err(OrderError::Storage(err)),
        };

        match result {
            Ok(()) => {
                tx.commit().await?;
                Ok(id)
            }
            // A failed rollback is reported together with the original error.
            Err(err) => match tx.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => Err(OrderError::RollbackFailed {
                    source: Box::new(err),
                    rollback,
                }),
            },
        }
    }
}
