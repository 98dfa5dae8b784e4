//! Payment gateway seam.
//!
//! The engine talks to the processor only through [`PaymentGateway`]; the
//! Razorpay HTTP client is the production implementation.

use crate::error::PaymentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const CAPTURED: &str = "captured";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor units.
    pub amount: u64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// Authoritative payment details as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayPayment {
    pub id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub amount: u64,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == CAPTURED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: Option<u64>,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, PaymentError>;

    /// Full refund of a captured payment.
    async fn create_refund(&self, payment_id: &str) -> Result<GatewayRefund, PaymentError>;

    /// Checkout callback check: HMAC over `order_id|payment_id` with the
    /// merchant secret, compared in constant time.
    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, PaymentError>;

    /// Public key id handed to checkout clients.
    fn key_id(&self) -> &str;
}
