use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Travel pass owned by the subscriptions service. Read-only here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: i64,
    pub user_id: i64,
    pub price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
