use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub wallet_id: i64,
    pub user_id: i64,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WalletTransactionType {
    TopUp,
    AdminTopUp,
    Payment,
}

impl WalletTransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::AdminTopUp => "admin_top_up",
            Self::Payment => "payment",
        }
    }
}

/// Append-only ledger line. `amount` is signed: credits positive, debits negative.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct WalletTransaction {
    pub transaction_id: i64,
    pub wallet_id: i64,
    pub amount: Decimal,
    pub transaction_type: WalletTransactionType,
    pub admin_id: Option<i64>,
    pub description: String,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A balance change to apply atomically with its ledger line.
#[derive(Debug, Clone)]
pub struct NewWalletEntry {
    pub wallet_id: i64,
    pub amount: Decimal,
    pub transaction_type: WalletTransactionType,
    pub admin_id: Option<i64>,
    pub description: String,
}

/// Newest-first page of wallet transactions.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<WalletTransaction>,
    /// Pass as `before` to fetch the next page.
    pub next_cursor: Option<i64>,
}
