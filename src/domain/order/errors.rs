use super::status::OrderStatus;

// ============================================================================
// Order Error Taxonomy
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order {0} not found")]
    NotFound(i64),

    /// The order was in a status matching neither the expectation nor the
    /// target. A caller error, not transient; retrying without a state
    /// change will fail again.
    #[error("invalid status transition for order {id}: current {current}, expected {expected}, requested {requested}")]
    InvalidTransition {
        id: i64,
        current: OrderStatus,
        expected: OrderStatus,
        requested: OrderStatus,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A transaction failed and the rollback failed too; both causes are
    /// surfaced together.
    #[error("tx err: {source}, rb err: {rollback}")]
    RollbackFailed {
        source: Box<OrderError>,
        rollback: sqlx::Error,
    },
}

impl OrderError {
    /// Whether the error reports a business-rule violation rather than an
    /// infrastructure failure.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, OrderError::InvalidTransition { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OrderError::NotFound(_))
    }
}
