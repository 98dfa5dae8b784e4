//! Wallet ledger: the only path that changes a wallet balance.

use crate::error::PaymentError;
use crate::models::{NewWalletEntry, TransactionPage, Wallet, WalletTransaction, WalletTransactionType};
use crate::services::metrics::LEDGER_ENTRIES_TOTAL;
use crate::services::repository::WalletRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct WalletLedger {
    wallets: Arc<dyn WalletRepository>,
}

/// Amounts must be positive with at most two decimal places.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::Validation(format!(
            "Amount must be greater than zero, got {}",
            amount
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(PaymentError::Validation(format!(
            "Amount {} has more than two decimal places",
            amount
        )));
    }
    Ok(amount)
}

impl WalletLedger {
    pub fn new(wallets: Arc<dyn WalletRepository>) -> Self {
        Self { wallets }
    }

    #[instrument(skip(self))]
    pub async fn create_wallet(&self, user_id: i64) -> Result<Wallet, PaymentError> {
        let wallet = self.wallets.create_wallet(user_id).await?;
        info!(wallet_id = wallet.wallet_id, user_id, "Wallet created");
        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: i64) -> Result<Wallet, PaymentError> {
        self.wallets
            .get_wallet(wallet_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Wallet {}", wallet_id)))
    }

    pub async fn wallet_for_user(&self, user_id: i64) -> Result<Wallet, PaymentError> {
        self.wallets
            .get_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Wallet for user {}", user_id)))
    }

    pub async fn balance(&self, wallet_id: i64) -> Result<Decimal, PaymentError> {
        Ok(self.get_wallet(wallet_id).await?.balance)
    }

    pub async fn credit(
        &self,
        wallet_id: i64,
        amount: Decimal,
        description: &str,
    ) -> Result<WalletTransaction, PaymentError> {
        let amount = validate_amount(amount)?;
        self.apply(NewWalletEntry {
            wallet_id,
            amount,
            transaction_type: WalletTransactionType::TopUp,
            admin_id: None,
            description: description.to_string(),
        })
        .await
    }

    /// Credit performed by an operator; the admin id is kept on the ledger line.
    pub async fn admin_credit(
        &self,
        wallet_id: i64,
        admin_id: i64,
        amount: Decimal,
        description: &str,
    ) -> Result<WalletTransaction, PaymentError> {
        let amount = validate_amount(amount)?;
        self.apply(NewWalletEntry {
            wallet_id,
            amount,
            transaction_type: WalletTransactionType::AdminTopUp,
            admin_id: Some(admin_id),
            description: description.to_string(),
        })
        .await
    }

    /// Fails with `InsufficientFunds` when `amount` exceeds the balance.
    pub async fn debit(
        &self,
        wallet_id: i64,
        amount: Decimal,
        description: &str,
    ) -> Result<WalletTransaction, PaymentError> {
        let amount = validate_amount(amount)?;
        self.apply(NewWalletEntry {
            wallet_id,
            amount: -amount,
            transaction_type: WalletTransactionType::Payment,
            admin_id: None,
            description: description.to_string(),
        })
        .await
    }

    #[instrument(skip(self, entry), fields(wallet_id = entry.wallet_id, amount = %entry.amount, transaction_type = entry.transaction_type.as_str()))]
    async fn apply(&self, entry: NewWalletEntry) -> Result<WalletTransaction, PaymentError> {
        let transaction_type = entry.transaction_type;
        match self.wallets.apply_entry(entry).await {
            Ok(tx) => {
                LEDGER_ENTRIES_TOTAL
                    .with_label_values(&[transaction_type.as_str(), "ok"])
                    .inc();
                info!(
                    transaction_id = tx.transaction_id,
                    balance_after = %tx.balance_after,
                    "Wallet ledger entry applied"
                );
                Ok(tx)
            }
            Err(e) => {
                LEDGER_ENTRIES_TOTAL
                    .with_label_values(&[transaction_type.as_str(), e.kind()])
                    .inc();
                warn!(error = %e, "Wallet ledger entry rejected");
                Err(e)
            }
        }
    }

    /// Newest first. `before` is the `next_cursor` of the previous page.
    pub async fn list_transactions(
        &self,
        wallet_id: i64,
        before: Option<i64>,
        limit: Option<i64>,
    ) -> Result<TransactionPage, PaymentError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        // Surface unknown wallets as NotFound rather than an empty page.
        self.get_wallet(wallet_id).await?;

        let transactions = self
            .wallets
            .list_transactions(wallet_id, before, limit)
            .await?;

        let next_cursor = if transactions.len() as i64 == limit {
            transactions.last().map(|t| t.transaction_id)
        } else {
            None
        };

        Ok(TransactionPage {
            transactions,
            next_cursor,
        })
    }
}
