use crate::models::{Coupon, DiscountType, PaymentIntent, PaymentStatus, PaymentType, Wallet};
use crate::services::payments::{CreatedIntent, VerifiedIntent};
use crate::services::Settlement;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_not_positive"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    #[validate(length(min = 1, message = "Payment type is required"))]
    pub payment_type: String,
    /// Must be positive for every target. Subscriptions are then charged at
    /// their stored price.
    pub amount: Decimal,
    #[validate(length(min = 3, max = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
    pub wallet_id: Option<i64>,
    pub card_id: Option<i64>,
    pub subscription_id: Option<i64>,
    pub booking_id: Option<i64>,
    #[validate(length(max = 64, message = "Coupon code is too long"))]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub intent_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub payment_type: PaymentType,
    pub target_id: i64,
    pub original_amount: Decimal,
    pub discount_amount: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PaymentIntent> for PaymentIntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            intent_id: intent.intent_id,
            payment_type: intent.payment_type(),
            target_id: intent.target.target_id(),
            gateway_order_id: intent.gateway_order_id,
            gateway_payment_id: intent.gateway_payment_id,
            original_amount: intent.original_amount,
            discount_amount: intent.discount_amount,
            amount: intent.amount,
            currency: intent.currency,
            coupon_code: intent.coupon_code,
            status: intent.status,
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        }
    }
}

/// Everything the client needs to open the gateway checkout.
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    #[serde(flatten)]
    pub intent: PaymentIntentResponse,
    pub razorpay_key_id: String,
    pub invoice_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_error: Option<String>,
}

impl From<CreatedIntent> for CreatePaymentResponse {
    fn from(created: CreatedIntent) -> Self {
        Self {
            intent: created.intent.into(),
            razorpay_key_id: created.gateway_key_id,
            invoice_id: created.invoice.map(|i| i.invoice_id),
            invoice_error: created.invoice_error,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub verified: bool,
    pub payment_type: PaymentType,
    pub intent: PaymentIntentResponse,
    pub settlement: Settlement,
}

impl From<VerifiedIntent> for VerifyPaymentResponse {
    fn from(verified: VerifiedIntent) -> Self {
        Self {
            verified: verified.verified,
            payment_type: verified.payment_type,
            intent: verified.intent.into(),
            settlement: verified.settlement,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AmountQuoteResponse {
    pub payment_type: PaymentType,
    pub target_id: i64,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyCouponRequest {
    #[validate(length(min = 1, max = 64, message = "Coupon code is required"))]
    pub code: String,
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, message = "Payment type is required"))]
    pub payment_type: String,
}

#[derive(Debug, Serialize)]
pub struct ApplyCouponResponse {
    pub code: String,
    pub original_amount: Decimal,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct CouponResponse {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub valid_until: DateTime<Utc>,
    pub payment_type: Option<PaymentType>,
}

impl From<Coupon> for CouponResponse {
    fn from(coupon: Coupon) -> Self {
        Self {
            code: coupon.code,
            discount_type: coupon.discount_type,
            discount_value: coupon.discount_value,
            valid_until: coupon.valid_until,
            payment_type: coupon.payment_type,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub wallet_id: i64,
    pub user_id: i64,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            wallet_id: wallet.wallet_id,
            user_id: wallet.user_id,
            balance: wallet.balance,
            created_at: wallet.created_at,
            updated_at: wallet.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransactionQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<i64>,
    pub before: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct WalletPaymentRequest {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(length(min = 1, max = 255, message = "Description is required"))]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminTopUpRequest {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
    #[validate(length(max = 255, message = "Description is too long"))]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_wallet_payment() {
        let request = WalletPaymentRequest {
            amount: Decimal::ZERO,
            description: "Metro ride".to_string(),
        };
        assert!(request.validate().is_err());

        let request = WalletPaymentRequest {
            amount: Decimal::new(4550, 2),
            description: "Metro ride".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn limit_is_bounded() {
        let query = TransactionQuery {
            limit: Some(101),
            before: None,
        };
        assert!(query.validate().is_err());

        let query = TransactionQuery {
            limit: None,
            before: Some(10),
        };
        assert!(query.validate().is_ok());
    }

    #[test]
    fn create_request_accepts_numeric_amounts() {
        let request: CreatePaymentRequest = serde_json::from_str(
            r#"{"payment_type":"card_topup","amount":100,"card_id":7,"coupon_code":null}"#,
        )
        .unwrap();
        assert_eq!(request.amount, Decimal::from(100));
        assert_eq!(request.card_id, Some(7));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_request_requires_an_amount() {
        let request = serde_json::from_str::<CreatePaymentRequest>(
            r#"{"payment_type":"subscription","subscription_id":3}"#,
        );
        assert!(request.is_err());
    }
}
