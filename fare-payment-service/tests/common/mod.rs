#![allow(dead_code)]

use chrono::{Duration, Utc};
use fare_payment_service::config::{Config, LedgerConfig, RazorpayConfig, StorageBackend};
use fare_payment_service::models::{Coupon, DiscountType, PaymentType};
use fare_payment_service::services::{InMemoryStore, PaymentGateway, RazorpayClient, Repositories};
use fare_payment_service::startup::Application;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::BaseConfig;
use service_core::utils::hmac_sha256_hex;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "rzp_test_secret";
pub const TEST_USER_ID: i64 = 1;
pub const TEST_ADMIN_ID: i64 = 900;

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<InMemoryStore>,
    pub razorpay: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let razorpay = MockServer::start().await;

        let config = Config {
            server: BaseConfig {
                port: 0,
                ..Default::default()
            },
            storage: StorageBackend::Memory,
            database: None,
            razorpay: RazorpayConfig {
                key_id: TEST_KEY_ID.to_string(),
                key_secret: Secret::new(TEST_KEY_SECRET.to_string()),
                api_base_url: razorpay.uri(),
                timeout_secs: 5,
            },
            ledger: LedgerConfig::default(),
            default_currency: "INR".to_string(),
            service_name: "fare-payment-service".to_string(),
        };

        let store = Arc::new(InMemoryStore::new());
        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            RazorpayClient::new(config.razorpay.clone()).expect("Failed to build Razorpay client"),
        );

        let app = Application::build_with(
            config,
            Repositories::from_store(store.clone()),
            gateway,
            None,
        )
        .await
        .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            store,
            razorpay,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get_as(&self, user_id: i64, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_as(&self, user_id: i64, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("X-User-ID", user_id.to_string())
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_wallet(&self, user_id: i64) -> i64 {
        let response = self.post_as(user_id, "/wallets", &json!({})).await;
        assert_eq!(response.status().as_u16(), 201);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        body["wallet_id"].as_i64().expect("wallet_id missing")
    }

    pub async fn admin_top_up(&self, wallet_id: i64, amount: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/admin/wallets/{}/top-up", wallet_id)))
            .header("X-Admin-ID", TEST_ADMIN_ID.to_string())
            .json(&json!({ "amount": amount }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn wallet_balance(&self, user_id: i64) -> Decimal {
        let body: Value = self
            .get_as(user_id, "/wallets/me")
            .await
            .json()
            .await
            .expect("Failed to parse JSON");
        decimal(&body["balance"])
    }

    pub async fn verify(&self, order_id: &str, payment_id: &str, signature: &str) -> reqwest::Response {
        self.client
            .post(self.url("/payments/verify"))
            .json(&json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": payment_id,
                "razorpay_signature": signature,
            }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Razorpay answers the next `POST /orders` with `order_id`.
    pub async fn mock_order(&self, order_id: &str) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "entity": "order",
                "amount": 0,
                "currency": "INR",
                "receipt": "rcpt",
                "status": "created",
            })))
            .up_to_n_times(1)
            .mount(&self.razorpay)
            .await;
    }

    /// `amount` is in paise, as Razorpay reports it.
    pub async fn mock_payment(&self, payment_id: &str, order_id: &str, status: &str, amount: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/payments/{}", payment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": payment_id,
                "entity": "payment",
                "amount": amount,
                "currency": "INR",
                "status": status,
                "order_id": order_id,
            })))
            .mount(&self.razorpay)
            .await;
    }

    pub async fn mock_refund(&self, payment_id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/payments/{}/refund", payment_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("rfnd_{}", payment_id),
                "entity": "refund",
                "payment_id": payment_id,
                "amount": 0,
                "status": "processed",
            })))
            .expect(expected_calls)
            .mount(&self.razorpay)
            .await;
    }

    pub fn seed_coupon(&self, code: &str, discount_type: DiscountType, value: i64, payment_type: Option<PaymentType>) {
        let now = Utc::now();
        self.store.insert_coupon(Coupon {
            coupon_id: 1,
            code: code.to_string(),
            discount_type,
            discount_value: Decimal::from(value),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            payment_type,
            created_at: now,
        });
    }
}

/// Signature Razorpay checkout hands back for `order_id|payment_id`.
pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(TEST_KEY_SECRET, &format!("{}|{}", order_id, payment_id))
        .expect("Failed to sign")
}

/// Money values are serialized as strings.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("invalid decimal"),
        other => other.to_string().parse().expect("invalid decimal"),
    }
}
