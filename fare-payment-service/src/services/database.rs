//! Postgres store for fare-payment-service.

use crate::config::LedgerConfig;
use crate::error::PaymentError;
use crate::models::payment::PaymentIntentRow;
use crate::models::{
    Booking, CardTopup, Coupon, Invoice, NewInvoice, NewWalletEntry, PaymentIntent, PaymentStatus,
    PaymentTarget, PaymentType, Subscription, TransitCard, Wallet, WalletTransaction,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{
    BookingRepository, CardRepository, CouponRepository, InvoiceGenerator, PaymentRepository,
    SubscriptionRepository, WalletRepository,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const OPEN_INTENT_INDEX: &str = "payment_intents_open_target_idx";

const INTENT_COLUMNS: &str = "intent_id, user_id, gateway_order_id, gateway_payment_id, \
    original_amount, discount_amount, amount, currency, payment_type, target_id, coupon_code, \
    status, created_at, updated_at";

const WALLET_TX_COLUMNS: &str = "transaction_id, wallet_id, amount, transaction_type, admin_id, \
    description, balance_after, created_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    ledger: LedgerConfig,
}

/// Serialization failures and deadlocks are safe to retry.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
    )
}

fn ledger_error(context: &str, err: sqlx::Error) -> backoff::Error<PaymentError> {
    if is_transient(&err) {
        warn!(error = %err, "{}: transient conflict, retrying", context);
        backoff::Error::transient(PaymentError::database(context, err))
    } else {
        backoff::Error::permanent(PaymentError::database(context, err))
    }
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url, ledger), fields(service = "fare-payment-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        ledger: LedgerConfig,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool, ledger })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.ledger.retry_initial_interval_ms),
            max_elapsed_time: Some(Duration::from_millis(self.ledger.retry_max_elapsed_ms)),
            ..Default::default()
        }
    }

    /// One attempt at a wallet write: SERIALIZABLE, wallet row locked.
    async fn apply_entry_once(
        &self,
        entry: &NewWalletEntry,
    ) -> Result<WalletTransaction, backoff::Error<PaymentError>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ledger_error("Failed to begin transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| ledger_error("Failed to set isolation level", e))?;

        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM wallets WHERE wallet_id = $1 FOR UPDATE")
                .bind(entry.wallet_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| ledger_error("Failed to lock wallet", e))?;

        let balance = balance.ok_or_else(|| {
            backoff::Error::permanent(PaymentError::NotFound(format!(
                "Wallet {}",
                entry.wallet_id
            )))
        })?;

        let balance_after = balance + entry.amount;
        if balance_after < Decimal::ZERO {
            return Err(backoff::Error::permanent(PaymentError::InsufficientFunds {
                balance,
                requested: -entry.amount,
            }));
        }

        sqlx::query("UPDATE wallets SET balance = $2, updated_at = NOW() WHERE wallet_id = $1")
            .bind(entry.wallet_id)
            .bind(balance_after)
            .execute(&mut *tx)
            .await
            .map_err(|e| ledger_error("Failed to update balance", e))?;

        let transaction = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            INSERT INTO wallet_transactions (wallet_id, amount, transaction_type, admin_id, description, balance_after)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            WALLET_TX_COLUMNS
        ))
        .bind(entry.wallet_id)
        .bind(entry.amount)
        .bind(entry.transaction_type.as_str())
        .bind(entry.admin_id)
        .bind(&entry.description)
        .bind(balance_after)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ledger_error("Failed to append wallet transaction", e))?;

        tx.commit()
            .await
            .map_err(|e| ledger_error("Failed to commit wallet transaction", e))?;

        Ok(transaction)
    }
}

#[async_trait]
impl PaymentRepository for Database {
    #[instrument(skip(self, intent), fields(intent_id = %intent.intent_id))]
    async fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), PaymentError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_intent"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payment_intents (intent_id, user_id, gateway_order_id, gateway_payment_id,
                original_amount, discount_amount, amount, currency, payment_type, target_id,
                coupon_code, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(intent.intent_id)
        .bind(intent.user_id)
        .bind(&intent.gateway_order_id)
        .bind(&intent.gateway_payment_id)
        .bind(intent.original_amount)
        .bind(intent.discount_amount)
        .bind(intent.amount)
        .bind(&intent.currency)
        .bind(intent.payment_type().as_str())
        .bind(intent.target.target_id())
        .bind(&intent.coupon_code)
        .bind(intent.status.as_str())
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.is_unique_violation()
                    && db_err.constraint() == Some(OPEN_INTENT_INDEX) =>
            {
                PaymentError::DuplicateIntent {
                    payment_type: intent.payment_type(),
                    target_id: intent.target.target_id(),
                }
            }
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                PaymentError::Conflict(format!(
                    "Gateway order {} is already recorded",
                    intent.gateway_order_id
                ))
            }
            _ => PaymentError::database("Failed to insert payment intent", e),
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_open_intent(
        &self,
        user_id: i64,
        target: PaymentTarget,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_open_intent"])
            .start_timer();

        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            r#"
            SELECT {}
            FROM payment_intents
            WHERE user_id = $1 AND payment_type = $2 AND target_id = $3 AND status = 'created'
            LIMIT 1
            "#,
            INTENT_COLUMNS
        ))
        .bind(user_id)
        .bind(target.payment_type().as_str())
        .bind(target.target_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to look up open intent", e))?;

        timer.observe_duration();
        Ok(row.map(PaymentIntent::from))
    }

    #[instrument(skip(self))]
    async fn get_intent(&self, intent_id: Uuid) -> Result<Option<PaymentIntent>, PaymentError> {
        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {} FROM payment_intents WHERE intent_id = $1",
            INTENT_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get payment intent", e))?;

        Ok(row.map(PaymentIntent::from))
    }

    #[instrument(skip(self))]
    async fn get_intent_by_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            "SELECT {} FROM payment_intents WHERE gateway_order_id = $1",
            INTENT_COLUMNS
        ))
        .bind(gateway_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get payment intent by order", e))?;

        Ok(row.map(PaymentIntent::from))
    }

    #[instrument(skip(self))]
    async fn transition(
        &self,
        intent_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_intent"])
            .start_timer();

        let row = sqlx::query_as::<_, PaymentIntentRow>(&format!(
            r#"
            UPDATE payment_intents
            SET status = $3,
                gateway_payment_id = COALESCE($4, gateway_payment_id),
                updated_at = NOW()
            WHERE intent_id = $1 AND status = $2
            RETURNING {}
            "#,
            INTENT_COLUMNS
        ))
        .bind(intent_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                PaymentError::Conflict(format!(
                    "Gateway payment {} is already attached to another intent",
                    gateway_payment_id.unwrap_or_default()
                ))
            }
            _ => PaymentError::database("Failed to update payment intent", e),
        })?;

        timer.observe_duration();

        if row.is_some() {
            info!(%intent_id, from = %from, to = %to, "Payment intent transitioned");
        }

        Ok(row.map(PaymentIntent::from))
    }
}

#[async_trait]
impl CouponRepository for Database {
    #[instrument(skip(self))]
    async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, PaymentError> {
        sqlx::query_as::<_, Coupon>(
            r#"
            SELECT coupon_id, code, discount_type, discount_value, valid_from, valid_until, payment_type, created_at
            FROM coupons
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get coupon", e))
    }

    #[instrument(skip(self))]
    async fn list_for_payment_type(
        &self,
        payment_type: PaymentType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, PaymentError> {
        sqlx::query_as::<_, Coupon>(
            r#"
            SELECT coupon_id, code, discount_type, discount_value, valid_from, valid_until, payment_type, created_at
            FROM coupons
            WHERE valid_from <= $2 AND valid_until > $2
              AND (payment_type IS NULL OR payment_type = $1)
            ORDER BY coupon_id
            "#,
        )
        .bind(payment_type.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to list coupons", e))
    }
}

#[async_trait]
impl WalletRepository for Database {
    #[instrument(skip(self))]
    async fn create_wallet(&self, user_id: i64) -> Result<Wallet, PaymentError> {
        sqlx::query_as::<_, Wallet>(
            r#"
            INSERT INTO wallets (user_id, balance)
            VALUES ($1, 0)
            RETURNING wallet_id, user_id, balance, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                PaymentError::Conflict(format!("User {} already has a wallet", user_id))
            }
            _ => PaymentError::database("Failed to create wallet", e),
        })
    }

    #[instrument(skip(self))]
    async fn get_wallet(&self, wallet_id: i64) -> Result<Option<Wallet>, PaymentError> {
        sqlx::query_as::<_, Wallet>(
            "SELECT wallet_id, user_id, balance, created_at, updated_at FROM wallets WHERE wallet_id = $1",
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get wallet", e))
    }

    #[instrument(skip(self))]
    async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>, PaymentError> {
        sqlx::query_as::<_, Wallet>(
            "SELECT wallet_id, user_id, balance, created_at, updated_at FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get wallet by user", e))
    }

    #[instrument(skip(self, entry), fields(wallet_id = entry.wallet_id))]
    async fn apply_entry(&self, entry: NewWalletEntry) -> Result<WalletTransaction, PaymentError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_wallet_entry"])
            .start_timer();

        let this = self;
        let entry = &entry;
        let transaction = retry(self.retry_policy(), || async move {
            this.apply_entry_once(entry).await
        })
        .await?;

        timer.observe_duration();
        Ok(transaction)
    }

    #[instrument(skip(self))]
    async fn list_transactions(
        &self,
        wallet_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, PaymentError> {
        sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            SELECT {}
            FROM wallet_transactions
            WHERE wallet_id = $1 AND ($2::bigint IS NULL OR transaction_id < $2)
            ORDER BY transaction_id DESC
            LIMIT $3
            "#,
            WALLET_TX_COLUMNS
        ))
        .bind(wallet_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to list wallet transactions", e))
    }
}

#[async_trait]
impl CardRepository for Database {
    #[instrument(skip(self))]
    async fn get_card(&self, card_id: i64) -> Result<Option<TransitCard>, PaymentError> {
        sqlx::query_as::<_, TransitCard>(
            r#"
            SELECT card_id, user_id, card_number, card_type, balance, created_at, updated_at
            FROM transit_cards
            WHERE card_id = $1
            "#,
        )
        .bind(card_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get card", e))
    }

    #[instrument(skip(self))]
    async fn credit_card(
        &self,
        card_id: i64,
        amount: Decimal,
    ) -> Result<(TransitCard, CardTopup), PaymentError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["credit_card"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PaymentError::database("Failed to begin transaction", e))?;

        let card = sqlx::query_as::<_, TransitCard>(
            r#"
            UPDATE transit_cards
            SET balance = balance + $2, updated_at = NOW()
            WHERE card_id = $1
            RETURNING card_id, user_id, card_number, card_type, balance, created_at, updated_at
            "#,
        )
        .bind(card_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| PaymentError::database("Failed to credit card", e))?
        .ok_or_else(|| PaymentError::NotFound(format!("Card {}", card_id)))?;

        let topup = sqlx::query_as::<_, CardTopup>(
            r#"
            INSERT INTO card_topups (card_id, amount)
            VALUES ($1, $2)
            RETURNING topup_id, card_id, amount, created_at
            "#,
        )
        .bind(card_id)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| PaymentError::database("Failed to record card top-up", e))?;

        tx.commit()
            .await
            .map_err(|e| PaymentError::database("Failed to commit card top-up", e))?;

        timer.observe_duration();
        Ok((card, topup))
    }

    #[instrument(skip(self))]
    async fn list_topups(&self, card_id: i64) -> Result<Vec<CardTopup>, PaymentError> {
        sqlx::query_as::<_, CardTopup>(
            r#"
            SELECT topup_id, card_id, amount, created_at
            FROM card_topups
            WHERE card_id = $1
            ORDER BY topup_id DESC
            "#,
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to list card top-ups", e))
    }
}

#[async_trait]
impl SubscriptionRepository for Database {
    #[instrument(skip(self))]
    async fn get_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Option<Subscription>, PaymentError> {
        sqlx::query_as::<_, Subscription>(
            "SELECT subscription_id, user_id, price, status, created_at FROM subscriptions WHERE subscription_id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get subscription", e))
    }
}

#[async_trait]
impl BookingRepository for Database {
    #[instrument(skip(self))]
    async fn get_booking(&self, booking_id: i64) -> Result<Option<Booking>, PaymentError> {
        sqlx::query_as::<_, Booking>(
            "SELECT booking_id, user_id, amount, status, created_at FROM bookings WHERE booking_id = $1",
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to get booking", e))
    }
}

#[async_trait]
impl InvoiceGenerator for Database {
    #[instrument(skip(self, invoice), fields(intent_id = %invoice.intent_id))]
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, PaymentError> {
        let invoice = invoice.into_invoice(Utc::now());

        sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (invoice_id, user_id, intent_id, original_amount, discount_amount,
                net_amount, payment_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING invoice_id, user_id, intent_id, original_amount, discount_amount, net_amount,
                payment_type, status, created_at
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.user_id)
        .bind(invoice.intent_id)
        .bind(invoice.original_amount)
        .bind(invoice.discount_amount)
        .bind(invoice.net_amount)
        .bind(invoice.payment_type.as_str())
        .bind(&invoice.status)
        .bind(invoice.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PaymentError::database("Failed to create invoice", e))
    }
}
