//! Payment intent and its settlement target.

use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of settlement a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    WalletTopup,
    #[serde(alias = "nol_card_topup")]
    CardTopup,
    Subscription,
    Booking,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletTopup => "wallet_topup",
            Self::CardTopup => "card_topup",
            Self::Subscription => "subscription",
            Self::Booking => "booking",
        }
    }

    /// Wallet top-ups may have several open intents at once.
    pub fn allows_concurrent_intents(&self) -> bool {
        matches!(self, Self::WalletTopup)
    }
}

impl FromStr for PaymentType {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "wallet_topup" => Ok(Self::WalletTopup),
            "card_topup" | "nol_card_topup" => Ok(Self::CardTopup),
            "subscription" => Ok(Self::Subscription),
            "booking" => Ok(Self::Booking),
            other => Err(PaymentError::UnsupportedPaymentType(other.to_string())),
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single entity a payment settles against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "payment_type", content = "target_id", rename_all = "snake_case")]
pub enum PaymentTarget {
    WalletTopup(i64),
    CardTopup(i64),
    Subscription(i64),
    Booking(i64),
}

impl PaymentTarget {
    pub fn from_parts(payment_type: PaymentType, target_id: i64) -> Self {
        match payment_type {
            PaymentType::WalletTopup => Self::WalletTopup(target_id),
            PaymentType::CardTopup => Self::CardTopup(target_id),
            PaymentType::Subscription => Self::Subscription(target_id),
            PaymentType::Booking => Self::Booking(target_id),
        }
    }

    /// Build a target from a declared type and the four optional references a
    /// request carries. Exactly one reference must be set and it must match
    /// the declared type.
    pub fn from_references(
        payment_type: PaymentType,
        wallet_id: Option<i64>,
        card_id: Option<i64>,
        subscription_id: Option<i64>,
        booking_id: Option<i64>,
    ) -> Result<Self, PaymentError> {
        let provided: Vec<(PaymentType, i64)> = [
            (PaymentType::WalletTopup, wallet_id),
            (PaymentType::CardTopup, card_id),
            (PaymentType::Subscription, subscription_id),
            (PaymentType::Booking, booking_id),
        ]
        .into_iter()
        .filter_map(|(t, id)| id.map(|id| (t, id)))
        .collect();

        match provided.as_slice() {
            [(declared, id)] if *declared == payment_type => Ok(Self::from_parts(payment_type, *id)),
            [(other, _)] => Err(PaymentError::Validation(format!(
                "{} payment cannot reference a {} target",
                payment_type, other
            ))),
            [] => Err(PaymentError::Validation(format!(
                "{} payment requires a target reference",
                payment_type
            ))),
            _ => Err(PaymentError::Validation(
                "Exactly one target reference may be provided".to_string(),
            )),
        }
    }

    pub fn payment_type(&self) -> PaymentType {
        match self {
            Self::WalletTopup(_) => PaymentType::WalletTopup,
            Self::CardTopup(_) => PaymentType::CardTopup,
            Self::Subscription(_) => PaymentType::Subscription,
            Self::Booking(_) => PaymentType::Booking,
        }
    }

    pub fn target_id(&self) -> i64 {
        match *self {
            Self::WalletTopup(id)
            | Self::CardTopup(id)
            | Self::Subscription(id)
            | Self::Booking(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Created,
    Verified,
    Settled,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Verified => "verified",
            Self::Settled => "settled",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Verified)
                | (Self::Created, Self::Refunded)
                | (Self::Created, Self::Failed)
                | (Self::Verified, Self::Settled)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single payment attempt and where it settles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentIntent {
    pub intent_id: Uuid,
    pub user_id: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    /// Net amount charged through the gateway.
    pub amount: Decimal,
    pub currency: String,
    pub target: PaymentTarget,
    pub coupon_code: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn payment_type(&self) -> PaymentType {
        self.target.payment_type()
    }
}

/// Row shape of `payment_intents`; the target is stored as type + id.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentIntentRow {
    pub intent_id: Uuid,
    pub user_id: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub payment_type: PaymentType,
    pub target_id: i64,
    pub coupon_code: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentIntentRow> for PaymentIntent {
    fn from(row: PaymentIntentRow) -> Self {
        Self {
            intent_id: row.intent_id,
            user_id: row.user_id,
            gateway_order_id: row.gateway_order_id,
            gateway_payment_id: row.gateway_payment_id,
            original_amount: row.original_amount,
            discount_amount: row.discount_amount,
            amount: row.amount,
            currency: row.currency,
            target: PaymentTarget::from_parts(row.payment_type, row.target_id),
            coupon_code: row.coupon_code,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
