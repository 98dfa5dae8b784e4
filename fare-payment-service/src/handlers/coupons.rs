use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{ApplyCouponRequest, ApplyCouponResponse, CouponResponse};
use crate::models::PaymentType;
use crate::startup::AppState;

/// Preview a coupon against an amount without creating an intent.
#[tracing::instrument(skip(state, request), fields(code = %request.code))]
pub async fn apply_coupon(
    State(state): State<AppState>,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApplyCouponResponse>, AppError> {
    request.validate()?;

    let payment_type: PaymentType = request.payment_type.parse()?;
    let applied = state
        .payments
        .coupons()
        .apply(request.code.trim(), request.amount, payment_type)
        .await?;

    Ok(Json(ApplyCouponResponse {
        code: applied.code,
        original_amount: request.amount,
        discount: applied.discount,
        final_amount: applied.final_amount,
    }))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    Path(payment_type): Path<String>,
) -> Result<Json<Vec<CouponResponse>>, AppError> {
    let payment_type: PaymentType = payment_type.parse()?;
    let coupons = state.payments.coupons().applicable(payment_type).await?;

    Ok(Json(coupons.into_iter().map(CouponResponse::from).collect()))
}
