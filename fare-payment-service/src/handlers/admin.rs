use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::AdminTopUpRequest;
use crate::middleware::AdminContext;
use crate::models::WalletTransaction;
use crate::startup::AppState;

/// Operator credit to any wallet; the admin id is recorded on the entry.
#[tracing::instrument(skip(state, request), fields(admin_id))]
pub async fn top_up_wallet(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(wallet_id): Path<i64>,
    Json(request): Json<AdminTopUpRequest>,
) -> Result<(StatusCode, Json<WalletTransaction>), AppError> {
    request.validate()?;

    let description = request
        .description
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| format!("Admin top-up by {}", admin.admin_id));

    let transaction = state
        .payments
        .ledger()
        .admin_credit(wallet_id, admin.admin_id, request.amount, &description)
        .await?;

    tracing::info!(
        wallet_id,
        transaction_id = transaction.transaction_id,
        "Admin top-up applied"
    );

    Ok((StatusCode::CREATED, Json(transaction)))
}
