use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    AmountQuoteResponse, CreatePaymentRequest, CreatePaymentResponse, PaymentIntentResponse,
    VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::error::PaymentError;
use crate::middleware::UserContext;
use crate::models::{PaymentTarget, PaymentType};
use crate::services::payments::CreateIntentRequest;
use crate::startup::AppState;

#[tracing::instrument(skip(state, request), fields(user_id))]
pub async fn create_payment(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), AppError> {
    request.validate()?;

    let payment_type: PaymentType = request.payment_type.parse()?;
    let target = PaymentTarget::from_references(
        payment_type,
        request.wallet_id,
        request.card_id,
        request.subscription_id,
        request.booking_id,
    )?;

    let created = state
        .payments
        .create_intent(CreateIntentRequest {
            user_id: user.user_id,
            amount: request.amount,
            currency: request
                .currency
                .unwrap_or_else(|| state.config.default_currency.clone()),
            target,
            coupon_code: request.coupon_code,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Checkout callback. Failed verifications of captured payments are refunded
/// before the error is returned.
#[tracing::instrument(skip(state, request), fields(order_id = %request.razorpay_order_id))]
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    request.validate()?;

    let verified = state
        .payments
        .verify_with_compensation(
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
        )
        .await?;

    Ok(Json(verified.into()))
}

#[tracing::instrument(skip(state), fields(user_id))]
pub async fn get_payment(
    State(state): State<AppState>,
    user: UserContext,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<PaymentIntentResponse>, AppError> {
    let intent = state.payments.get_status(intent_id).await?;

    // Other users' intents are reported as missing.
    if intent.user_id != user.user_id {
        return Err(PaymentError::NotFound(format!("Payment intent {}", intent_id)).into());
    }

    Ok(Json(intent.into()))
}

pub async fn quote_amount(
    State(state): State<AppState>,
    Path((payment_type, target_id)): Path<(String, i64)>,
) -> Result<Json<AmountQuoteResponse>, AppError> {
    let payment_type: PaymentType = payment_type.parse()?;
    let target = PaymentTarget::from_parts(payment_type, target_id);
    let amount = state.payments.quote_amount(target).await?;

    Ok(Json(AmountQuoteResponse {
        payment_type,
        target_id,
        amount,
    }))
}
