use super::PaymentType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const INVOICE_STATUS_ISSUED: &str = "issued";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub user_id: i64,
    pub intent_id: Uuid,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub net_amount: Decimal,
    pub payment_type: PaymentType,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub user_id: i64,
    pub intent_id: Uuid,
    pub original_amount: Decimal,
    pub payment_type: PaymentType,
    pub discount_amount: Decimal,
}

impl NewInvoice {
    pub fn into_invoice(self, now: DateTime<Utc>) -> Invoice {
        Invoice {
            invoice_id: Uuid::new_v4(),
            user_id: self.user_id,
            intent_id: self.intent_id,
            original_amount: self.original_amount,
            discount_amount: self.discount_amount,
            net_amount: self.original_amount - self.discount_amount,
            payment_type: self.payment_type,
            status: INVOICE_STATUS_ISSUED.to_string(),
            created_at: now,
        }
    }
}
