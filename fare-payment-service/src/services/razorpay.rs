//! Razorpay payment provider client.
//!
//! Implements the Orders, Payments and Refunds APIs plus checkout signature
//! verification.

use crate::config::RazorpayConfig;
use crate::error::PaymentError;
use crate::services::gateway::{GatewayOrder, GatewayPayment, GatewayRefund, PaymentGateway};
use crate::services::metrics::GATEWAY_REQUEST_DURATION;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use service_core::utils::signature::{hmac_sha256_hex, verify_hmac_sha256_hex};
use std::time::Duration;

#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: u64,
    currency: String,
    receipt: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayPayment {
    id: String,
    amount: u64,
    status: String,
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayRefund {
    id: String,
    payment_id: String,
    amount: Option<u64>,
    status: String,
}

/// Razorpay API error response.
#[derive(Debug, Deserialize)]
struct RazorpayError {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    code: String,
    description: String,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self, PaymentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Gateway(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Signature Razorpay checkout returns for a successful payment.
    pub fn checkout_signature(&self, order_id: &str, payment_id: &str) -> Result<String, PaymentError> {
        hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            &format!("{}|{}", order_id, payment_id),
        )
        .map_err(|e| PaymentError::Gateway(e.to_string()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(
            &self.config.key_id,
            Some(self.config.key_secret.expose_secret()),
        )
    }

    /// Send, read the body as text, and decode either the entity or
    /// Razorpay's error envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<(T, serde_json::Value), PaymentError> {
        let timer = GATEWAY_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let response = self.authed(request).send().await.map_err(|e| {
            let reason = if e.is_timeout() { "timed out" } else { "request failed" };
            tracing::error!(operation, error = %e, "Razorpay {}", reason);
            PaymentError::Gateway(format!("{} {}: {}", operation, reason, e))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Gateway(format!("{} response unreadable: {}", operation, e)))?;
        timer.observe_duration();

        tracing::debug!(operation, status = %status, "Razorpay response");

        if !status.is_success() {
            let (code, description) = match serde_json::from_str::<RazorpayError>(&body) {
                Ok(err) => (err.error.code, err.error.description),
                Err(_) => ("UNKNOWN".to_string(), body.clone()),
            };
            tracing::error!(
                operation,
                status = %status,
                code = %code,
                description = %description,
                "Razorpay request failed"
            );
            return Err(PaymentError::Gateway(format!(
                "{} failed: {} - {}",
                operation, code, description
            )));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| PaymentError::Gateway(format!("{} returned invalid JSON: {}", operation, e)))?;
        let entity = serde_json::from_value(raw.clone())
            .map_err(|e| PaymentError::Gateway(format!("{} returned unexpected body: {}", operation, e)))?;

        Ok((entity, raw))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, PaymentError> {
        let request = self.client.post(self.url("/orders")).json(&CreateOrderRequest {
            amount: amount_minor,
            currency,
            receipt,
        });

        let (order, _): (RazorpayOrder, _) = self.send("create_order", request).await?;

        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            currency = %order.currency,
            "Razorpay order created"
        );

        Ok(GatewayOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            status: order.status,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, PaymentError> {
        let request = self.client.get(self.url(&format!("/payments/{}", payment_id)));
        let (payment, raw): (RazorpayPayment, _) = self.send("fetch_payment", request).await?;

        Ok(GatewayPayment {
            id: payment.id,
            order_id: payment.order_id,
            status: payment.status,
            amount: payment.amount,
            raw,
        })
    }

    async fn create_refund(&self, payment_id: &str) -> Result<GatewayRefund, PaymentError> {
        let request = self
            .client
            .post(self.url(&format!("/payments/{}/refund", payment_id)))
            .json(&serde_json::json!({}));
        let (refund, _): (RazorpayRefund, _) = self.send("create_refund", request).await?;

        tracing::info!(refund_id = %refund.id, payment_id = %refund.payment_id, "Razorpay refund created");

        Ok(GatewayRefund {
            id: refund.id,
            payment_id: refund.payment_id,
            amount: refund.amount,
            status: refund.status,
        })
    }

    fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool, PaymentError> {
        verify_hmac_sha256_hex(
            self.config.key_secret.expose_secret(),
            &format!("{}|{}", order_id, payment_id),
            signature,
        )
        .map_err(|e| PaymentError::Gateway(e.to_string()))
    }

    fn key_id(&self) -> &str {
        &self.config.key_id
    }
}
