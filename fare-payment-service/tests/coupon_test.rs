mod common;

use chrono::{Duration, Utc};
use common::{decimal, TestApp};
use fare_payment_service::models::{Coupon, DiscountType, PaymentType};
use rust_decimal::Decimal;
use serde_json::{json, Value};

async fn apply(app: &TestApp, code: &str, amount: &str, payment_type: &str) -> reqwest::Response {
    app.client
        .post(app.url("/coupons/apply"))
        .json(&json!({ "code": code, "amount": amount, "payment_type": payment_type }))
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
async fn percentage_coupon_is_applied() {
    let app = TestApp::spawn().await;
    app.seed_coupon("SAVE10", DiscountType::Percentage, 10, None);

    let response = apply(&app, "SAVE10", "1000", "wallet_topup").await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(decimal(&body["discount"]), Decimal::from(100));
    assert_eq!(decimal(&body["final_amount"]), Decimal::from(900));
}

#[tokio::test]
async fn fixed_discount_is_capped_at_amount() {
    let app = TestApp::spawn().await;
    app.seed_coupon("FLAT500", DiscountType::Fixed, 500, None);

    let body: Value = apply(&app, "FLAT500", "120", "booking")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&body["discount"]), Decimal::from(120));
    assert_eq!(decimal(&body["final_amount"]), Decimal::ZERO);
}

#[tokio::test]
async fn restricted_expired_and_unknown_coupons_are_rejected() {
    let app = TestApp::spawn().await;
    app.seed_coupon("CARDONLY", DiscountType::Fixed, 10, Some(PaymentType::CardTopup));

    let now = Utc::now();
    app.store.insert_coupon(Coupon {
        coupon_id: 2,
        code: "OLD".to_string(),
        discount_type: DiscountType::Fixed,
        discount_value: Decimal::from(10),
        valid_from: now - Duration::days(30),
        valid_until: now - Duration::days(1),
        payment_type: None,
        created_at: now - Duration::days(30),
    });

    assert_eq!(apply(&app, "CARDONLY", "100", "wallet_topup").await.status().as_u16(), 400);
    assert_eq!(apply(&app, "CARDONLY", "100", "card_topup").await.status().as_u16(), 200);
    assert_eq!(apply(&app, "OLD", "100", "booking").await.status().as_u16(), 400);
    assert_eq!(apply(&app, "MISSING", "100", "booking").await.status().as_u16(), 400);
    assert_eq!(apply(&app, "OLD", "-5", "booking").await.status().as_u16(), 422);
}

#[tokio::test]
async fn lists_only_applicable_active_coupons() {
    let app = TestApp::spawn().await;
    app.seed_coupon("ANY", DiscountType::Fixed, 5, None);
    app.seed_coupon("CARDONLY", DiscountType::Fixed, 10, Some(PaymentType::CardTopup));

    let body: Value = app
        .client
        .get(app.url("/coupons/wallet_topup"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let codes: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["ANY"]);
}
