//! Domain errors for the payment engine.

use crate::models::PaymentType;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CouponError {
    #[error("Coupon '{0}' not found")]
    NotFound(String),

    #[error("Coupon '{0}' is not active")]
    Expired(String),

    #[error("Coupon '{code}' only applies to {expected} payments, not {actual}")]
    TypeMismatch {
        code: String,
        expected: PaymentType,
        actual: PaymentType,
    },
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported payment type: {0}")]
    UnsupportedPaymentType(String),

    #[error("An open {payment_type} payment already exists for target {target_id}")]
    DuplicateIntent {
        payment_type: PaymentType,
        target_id: i64,
    },

    #[error("Amount after discount must be greater than zero")]
    AmountNonPositive,

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment {payment_id} belongs to order {actual}, not {expected}")]
    OrderMismatch {
        payment_id: String,
        expected: String,
        actual: String,
    },

    #[error("Payment {payment_id} is for {actual} minor units, expected {expected}")]
    AmountMismatch {
        payment_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Payment {payment_id} is not captured (status: {status})")]
    NotCaptured { payment_id: String, status: String },

    #[error("Payment {payment_id} is not eligible for refund (status: {status})")]
    NotEligible { payment_id: String, status: String },

    #[error("Payment for order {0} has already been processed")]
    AlreadyProcessed(String),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Settlement failed for payment intent {intent_id}: {reason}")]
    SettlementFailed { intent_id: Uuid, reason: String },

    #[error("{verification}; payment refunded (refund id {refund_id})")]
    VerificationRefunded {
        verification: Box<PaymentError>,
        refund_id: String,
    },

    #[error(
        "Verification failed ({verification}) and refund failed ({refund}); manual follow-up required"
    )]
    RefundFailed {
        verification: Box<PaymentError>,
        refund: Box<PaymentError>,
    },

    #[error("Database error: {0:#}")]
    Database(anyhow::Error),
}

impl PaymentError {
    /// Failures that leave a captured payment the merchant cannot honour,
    /// so the payment should be refunded. Gateway errors are not among them:
    /// the intent stays open and the callback can be retried.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            PaymentError::InvalidSignature
                | PaymentError::NotCaptured { .. }
                | PaymentError::OrderMismatch { .. }
                | PaymentError::AmountMismatch { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "validation",
            PaymentError::UnsupportedPaymentType(_) => "unsupported_payment_type",
            PaymentError::DuplicateIntent { .. } => "duplicate_intent",
            PaymentError::AmountNonPositive => "amount_non_positive",
            PaymentError::Coupon(_) => "coupon",
            PaymentError::Gateway(_) => "gateway",
            PaymentError::InvalidSignature => "invalid_signature",
            PaymentError::OrderMismatch { .. } => "order_mismatch",
            PaymentError::AmountMismatch { .. } => "amount_mismatch",
            PaymentError::NotCaptured { .. } => "not_captured",
            PaymentError::NotEligible { .. } => "not_eligible",
            PaymentError::AlreadyProcessed(_) => "already_processed",
            PaymentError::InsufficientFunds { .. } => "insufficient_funds",
            PaymentError::NotFound(_) => "not_found",
            PaymentError::Conflict(_) => "conflict",
            PaymentError::SettlementFailed { .. } => "settlement_failed",
            PaymentError::VerificationRefunded { .. } => "verification_refunded",
            PaymentError::RefundFailed { .. } => "refund_failed",
            PaymentError::Database(_) => "database",
        }
    }

    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        PaymentError::Database(anyhow::anyhow!("{}: {}", context, err))
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::Validation(_)
            | PaymentError::UnsupportedPaymentType(_)
            | PaymentError::AmountNonPositive
            | PaymentError::Coupon(_)
            | PaymentError::InvalidSignature
            | PaymentError::OrderMismatch { .. }
            | PaymentError::AmountMismatch { .. }
            | PaymentError::NotCaptured { .. }
            | PaymentError::NotEligible { .. }
            | PaymentError::VerificationRefunded { .. } => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            PaymentError::DuplicateIntent { .. }
            | PaymentError::Conflict(_)
            | PaymentError::AlreadyProcessed(_) => AppError::Conflict(anyhow::anyhow!(message)),
            PaymentError::Gateway(_) => AppError::BadGateway(message),
            PaymentError::InsufficientFunds { .. } => {
                AppError::PaymentRequired(anyhow::anyhow!(message))
            }
            PaymentError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            PaymentError::SettlementFailed { .. } | PaymentError::RefundFailed { .. } => {
                AppError::InternalError(anyhow::anyhow!(message))
            }
            PaymentError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn verification_failures_are_classified() {
        assert!(PaymentError::InvalidSignature.is_verification_failure());
        assert!(PaymentError::AmountMismatch {
            payment_id: "pay_1".into(),
            expected: 50000,
            actual: 100,
        }
        .is_verification_failure());
        assert!(!PaymentError::Gateway("timeout".into()).is_verification_failure());
        assert!(!PaymentError::AlreadyProcessed("order_1".into()).is_verification_failure());
        assert!(!PaymentError::NotFound("Payment intent".into()).is_verification_failure());
    }

    #[test]
    fn maps_to_http_status() {
        let cases = [
            (PaymentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (
                PaymentError::DuplicateIntent {
                    payment_type: PaymentType::CardTopup,
                    target_id: 7,
                },
                StatusCode::CONFLICT,
            ),
            (PaymentError::Gateway("down".into()), StatusCode::BAD_GATEWAY),
            (
                PaymentError::InsufficientFunds {
                    balance: Decimal::ZERO,
                    requested: Decimal::ONE,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (PaymentError::NotFound("Wallet 1".into()), StatusCode::NOT_FOUND),
            (
                PaymentError::Coupon(CouponError::Expired("SPRING".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }

    #[test]
    fn refund_failure_reports_both_errors() {
        let err = PaymentError::RefundFailed {
            verification: Box::new(PaymentError::InvalidSignature),
            refund: Box::new(PaymentError::Gateway("refund rejected".into())),
        };
        let message = err.to_string();
        assert!(message.contains("Invalid payment signature"));
        assert!(message.contains("refund rejected"));
        assert_eq!(
            AppError::from(err).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
