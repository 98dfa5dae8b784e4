mod common;

use common::{checkout_signature, decimal, TestApp, TEST_USER_ID};
use fare_payment_service::models::{CardType, DiscountType, PaymentType};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio_test::assert_ok;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn coupon_top_up_credits_discounted_amount() {
    let app = TestApp::spawn().await;
    app.seed_coupon("SAVE10", DiscountType::Percentage, 10, Some(PaymentType::WalletTopup));
    let wallet_id = app.create_wallet(TEST_USER_ID).await;

    // Razorpay must be asked for 900.00 INR in paise.
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_partial_json(json!({ "amount": 90000, "currency": "INR" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_coupon",
            "amount": 90000,
            "currency": "INR",
            "receipt": "rcpt",
            "status": "created",
        })))
        .expect(1)
        .mount(&app.razorpay)
        .await;

    let response = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({
                "payment_type": "wallet_topup",
                "amount": 1000,
                "wallet_id": wallet_id,
                "coupon_code": "SAVE10",
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let created: Value = response.json().await.unwrap();
    assert_eq!(created["gateway_order_id"], "order_coupon");
    assert_eq!(created["razorpay_key_id"], common::TEST_KEY_ID);
    assert_eq!(created["status"], "created");
    assert_eq!(decimal(&created["original_amount"]), Decimal::from(1000));
    assert_eq!(decimal(&created["discount_amount"]), Decimal::from(100));
    assert_eq!(decimal(&created["amount"]), Decimal::from(900));
    assert!(created["invoice_id"].is_string());

    app.mock_payment("pay_coupon", "order_coupon", "captured", 90000).await;

    let response = app
        .verify(
            "order_coupon",
            "pay_coupon",
            &checkout_signature("order_coupon", "pay_coupon"),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let verified: Value = response.json().await.unwrap();
    assert_eq!(verified["verified"], true);
    assert_eq!(verified["payment_type"], "wallet_topup");
    assert_eq!(verified["intent"]["status"], "settled");
    assert_eq!(verified["settlement"]["kind"], "wallet_credited");

    assert_eq!(app.wallet_balance(TEST_USER_ID).await, Decimal::from(900));
}

#[tokio::test]
async fn verifying_twice_settles_once() {
    let app = TestApp::spawn().await;
    let wallet_id = app.create_wallet(TEST_USER_ID).await;
    app.mock_order("order_twice").await;

    let response = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "wallet_topup", "amount": "150.50", "wallet_id": wallet_id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    app.mock_payment("pay_twice", "order_twice", "captured", 15050).await;
    app.mock_refund("pay_twice", 0).await;
    let signature = checkout_signature("order_twice", "pay_twice");

    let first = app.verify("order_twice", "pay_twice", &signature).await;
    assert_eq!(first.status().as_u16(), 200);

    let second = app.verify("order_twice", "pay_twice", &signature).await;
    assert_eq!(second.status().as_u16(), 409);

    let page: Value = app
        .get_as(TEST_USER_ID, "/wallets/me/transactions")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(app.wallet_balance(TEST_USER_ID).await, Decimal::new(15050, 2));
}

#[tokio::test]
async fn card_top_up_is_credited_to_card() {
    let app = TestApp::spawn().await;
    app.store.insert_card(7, TEST_USER_ID, CardType::Gold, Decimal::ZERO);
    app.mock_order("order_card").await;

    let response = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "nol_card_topup", "amount": 100, "card_id": 7 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["payment_type"], "card_topup");
    assert_eq!(created["target_id"], 7);

    app.mock_payment("pay_card", "order_card", "captured", 10000).await;
    let response = app
        .verify("order_card", "pay_card", &checkout_signature("order_card", "pay_card"))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let verified: Value = response.json().await.unwrap();
    assert_eq!(verified["settlement"]["kind"], "card_credited");
    assert_eq!(verified["settlement"]["card_id"], 7);
    assert_eq!(
        decimal(&verified["settlement"]["balance_after"]),
        Decimal::from(100)
    );
}

#[tokio::test]
async fn forged_signature_triggers_refund() {
    let app = TestApp::spawn().await;
    let wallet_id = app.create_wallet(TEST_USER_ID).await;
    app.mock_order("order_forged").await;

    let created: Value = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "wallet_topup", "amount": 500, "wallet_id": wallet_id }),
        )
        .await
        .json()
        .await
        .unwrap();
    let intent_id = created["intent_id"].as_str().unwrap().to_string();

    app.mock_payment("pay_forged", "order_forged", "captured", 50000).await;
    app.mock_refund("pay_forged", 1).await;

    let response = app
        .verify("order_forged", "pay_forged", &checkout_signature("order_forged", "pay_other"))
        .await;
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("Invalid payment signature"));
    assert!(error.contains("rfnd_pay_forged"));

    assert_eq!(app.wallet_balance(TEST_USER_ID).await, Decimal::ZERO);

    let intent: Value = app
        .get_as(TEST_USER_ID, &format!("/payments/{}", intent_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(intent["status"], "refunded");
}

#[tokio::test]
async fn replayed_callback_with_bad_signature_is_not_refunded() {
    let app = TestApp::spawn().await;
    let wallet_id = app.create_wallet(TEST_USER_ID).await;
    app.mock_order("order_replay").await;

    let response = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "wallet_topup", "amount": 900, "wallet_id": wallet_id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    app.mock_payment("pay_replay", "order_replay", "captured", 90000).await;
    app.mock_refund("pay_replay", 0).await;

    let settled = app
        .verify("order_replay", "pay_replay", &checkout_signature("order_replay", "pay_replay"))
        .await;
    assert_eq!(settled.status().as_u16(), 200);

    let replay = app.verify("order_replay", "pay_replay", "garbage").await;
    assert_eq!(replay.status().as_u16(), 400);
    let body: Value = replay.json().await.unwrap();
    assert_eq!(body["error"], "Invalid payment signature");

    assert_eq!(app.wallet_balance(TEST_USER_ID).await, Decimal::from(900));
}

#[tokio::test]
async fn second_open_card_intent_conflicts() {
    let app = TestApp::spawn().await;
    app.store.insert_card(7, TEST_USER_ID, CardType::Ordinary, Decimal::ZERO);
    app.mock_order("order_first").await;
    app.mock_order("order_second").await;

    let body = json!({ "payment_type": "card_topup", "amount": 20, "card_id": 7 });
    let first = app.post_as(TEST_USER_ID, "/payments", &body).await;
    assert_eq!(first.status().as_u16(), 201);

    let second = app.post_as(TEST_USER_ID, "/payments", &body).await;
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
async fn card_minimum_and_ownership_are_enforced() {
    let app = TestApp::spawn().await;
    app.store.insert_card(7, TEST_USER_ID, CardType::Gold, Decimal::ZERO);
    app.store.insert_card(8, 2, CardType::Silver, Decimal::ZERO);

    let below_minimum = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "card_topup", "amount": 99, "card_id": 7 }),
        )
        .await;
    assert_eq!(below_minimum.status().as_u16(), 400);

    let not_owner = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "card_topup", "amount": 100, "card_id": 8 }),
        )
        .await;
    assert_eq!(not_owner.status().as_u16(), 400);

    let mismatched_reference = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "card_topup", "amount": 100, "wallet_id": 1 }),
        )
        .await;
    assert_eq!(mismatched_reference.status().as_u16(), 400);

    let unknown_type = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "parking", "amount": 100, "card_id": 7 }),
        )
        .await;
    assert_eq!(unknown_type.status().as_u16(), 400);
}

#[tokio::test]
async fn gateway_failure_creates_no_intent() {
    let app = TestApp::spawn().await;
    let wallet_id = app.create_wallet(TEST_USER_ID).await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "BAD_REQUEST_ERROR", "description": "Authentication failed" }
        })))
        .mount(&app.razorpay)
        .await;

    let response = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "wallet_topup", "amount": 100, "wallet_id": wallet_id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 502);
}

#[tokio::test]
async fn subscription_amount_is_quoted_and_charged() {
    let app = TestApp::spawn().await;
    app.store.insert_subscription(3, TEST_USER_ID, Decimal::new(49900, 2));
    app.mock_order("order_sub").await;

    let quote: Value = app
        .client
        .get(app.url("/payments/amount/subscription/3"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&quote["amount"]), Decimal::new(49900, 2));

    let zero = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "subscription", "amount": 0, "subscription_id": 3 }),
        )
        .await;
    assert_eq!(zero.status().as_u16(), 400);

    let missing = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "subscription", "subscription_id": 3 }),
        )
        .await;
    assert!(missing.status().is_client_error());

    let response = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "subscription", "amount": 1, "subscription_id": 3 }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let created: Value = response.json().await.unwrap();
    assert_eq!(decimal(&created["amount"]), Decimal::new(49900, 2));

    app.mock_payment("pay_sub", "order_sub", "captured", 49900).await;
    let verified: Value = assert_ok!(
        app.verify("order_sub", "pay_sub", &checkout_signature("order_sub", "pay_sub"))
            .await
            .json::<Value>()
            .await
    );
    assert_eq!(verified["settlement"]["kind"], "acknowledged");
    assert_eq!(verified["intent"]["status"], "settled");
}

#[tokio::test]
async fn other_users_cannot_read_an_intent() {
    let app = TestApp::spawn().await;
    let wallet_id = app.create_wallet(TEST_USER_ID).await;
    app.mock_order("order_private").await;

    let created: Value = app
        .post_as(
            TEST_USER_ID,
            "/payments",
            &json!({ "payment_type": "wallet_topup", "amount": 10, "wallet_id": wallet_id }),
        )
        .await
        .json()
        .await
        .unwrap();
    let intent_path = format!("/payments/{}", created["intent_id"].as_str().unwrap());

    assert_eq!(app.get_as(TEST_USER_ID, &intent_path).await.status().as_u16(), 200);
    assert_eq!(app.get_as(2, &intent_path).await.status().as_u16(), 404);
}
