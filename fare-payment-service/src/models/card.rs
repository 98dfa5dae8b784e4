use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Gold,
    Silver,
    Ordinary,
}

impl CardType {
    /// Smallest top-up accepted for this card tier.
    pub fn minimum_topup(&self) -> Decimal {
        match self {
            Self::Gold => Decimal::from(100),
            Self::Silver => Decimal::from(50),
            Self::Ordinary => Decimal::from(20),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Ordinary => "ordinary",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct TransitCard {
    pub card_id: i64,
    pub user_id: i64,
    pub card_number: String,
    pub card_type: CardType,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct CardTopup {
    pub topup_id: i64,
    pub card_id: i64,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}
