use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::status::OrderStatus;

// ============================================================================
// Order Entity
// ============================================================================

/// One purchasable unit under saga control.
///
/// `id` is assigned by storage on insert; `status` is only ever mutated
/// through the transition engine. `message` carries a free-text annotation,
/// typically the failure reason.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: String,
    pub status: OrderStatus,
    pub amount: Decimal,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
