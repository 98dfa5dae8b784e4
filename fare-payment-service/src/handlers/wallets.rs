use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{TransactionQuery, WalletPaymentRequest, WalletResponse};
use crate::middleware::UserContext;
use crate::models::{TransactionPage, WalletTransaction};
use crate::startup::AppState;

#[tracing::instrument(skip(state), fields(user_id))]
pub async fn create_wallet(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<(StatusCode, Json<WalletResponse>), AppError> {
    let wallet = state.payments.ledger().create_wallet(user.user_id).await?;
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

pub async fn get_my_wallet(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<Json<WalletResponse>, AppError> {
    let wallet = state.payments.ledger().wallet_for_user(user.user_id).await?;
    Ok(Json(wallet.into()))
}

pub async fn list_my_transactions(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<TransactionPage>, AppError> {
    query.validate()?;

    let ledger = state.payments.ledger();
    let wallet = ledger.wallet_for_user(user.user_id).await?;
    let page = ledger
        .list_transactions(wallet.wallet_id, query.before, query.limit)
        .await?;

    Ok(Json(page))
}

/// Pay for a ride or service directly from the wallet balance.
#[tracing::instrument(skip(state, request), fields(user_id))]
pub async fn pay_from_wallet(
    State(state): State<AppState>,
    user: UserContext,
    Json(request): Json<WalletPaymentRequest>,
) -> Result<(StatusCode, Json<WalletTransaction>), AppError> {
    request.validate()?;

    let ledger = state.payments.ledger();
    let wallet = ledger.wallet_for_user(user.user_id).await?;
    let transaction = ledger
        .debit(wallet.wallet_id, request.amount, &request.description)
        .await?;

    Ok((StatusCode::CREATED, Json(transaction)))
}
