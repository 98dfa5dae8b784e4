//! Storage seams for the payment engine.
//!
//! Postgres (`database.rs`) and the in-process store (`memory.rs`) implement
//! every trait here; the engine only ever sees `Arc<dyn ...>`.

use crate::error::PaymentError;
use crate::models::{
    Booking, CardTopup, Coupon, Invoice, NewInvoice, NewWalletEntry, PaymentIntent, PaymentStatus,
    PaymentTarget, PaymentType, Subscription, TransitCard, Wallet, WalletTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Persist a new intent. A racing open intent for the same target fails
    /// with `DuplicateIntent`.
    async fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), PaymentError>;

    async fn find_open_intent(
        &self,
        user_id: i64,
        target: PaymentTarget,
    ) -> Result<Option<PaymentIntent>, PaymentError>;

    async fn get_intent(&self, intent_id: Uuid) -> Result<Option<PaymentIntent>, PaymentError>;

    async fn get_intent_by_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError>;

    /// Compare-and-set the status. Returns `None` when the intent was no longer
    /// in `from`. A `gateway_payment_id` already attached to another intent is
    /// a `Conflict`.
    async fn transition(
        &self,
        intent_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> Result<Option<PaymentIntent>, PaymentError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, PaymentError>;

    /// Coupons active at `now` that are unrestricted or restricted to `payment_type`.
    async fn list_for_payment_type(
        &self,
        payment_type: PaymentType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, PaymentError>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// `Conflict` when the user already owns a wallet.
    async fn create_wallet(&self, user_id: i64) -> Result<Wallet, PaymentError>;

    async fn get_wallet(&self, wallet_id: i64) -> Result<Option<Wallet>, PaymentError>;

    async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>, PaymentError>;

    /// Apply a signed amount and append its ledger line as one atomic unit,
    /// serialized per wallet. A debit larger than the balance fails with
    /// `InsufficientFunds` and changes nothing.
    async fn apply_entry(&self, entry: NewWalletEntry) -> Result<WalletTransaction, PaymentError>;

    /// Newest first, strictly older than `before` when given.
    async fn list_transactions(
        &self,
        wallet_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, PaymentError>;
}

#[async_trait]
pub trait CardRepository: Send + Sync {
    async fn get_card(&self, card_id: i64) -> Result<Option<TransitCard>, PaymentError>;

    /// Increase the card balance and record the top-up together.
    async fn credit_card(
        &self,
        card_id: i64,
        amount: Decimal,
    ) -> Result<(TransitCard, CardTopup), PaymentError>;

    async fn list_topups(&self, card_id: i64) -> Result<Vec<CardTopup>, PaymentError>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Option<Subscription>, PaymentError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_booking(&self, booking_id: i64) -> Result<Option<Booking>, PaymentError>;
}

/// Billing record producer, invoked once per created payment.
#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, PaymentError>;
}

/// Every store the engine needs, as trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub payments: Arc<dyn PaymentRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub wallets: Arc<dyn WalletRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub invoices: Arc<dyn InvoiceGenerator>,
}

impl Repositories {
    /// Use one backing store for every seam.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: PaymentRepository
            + CouponRepository
            + WalletRepository
            + CardRepository
            + SubscriptionRepository
            + BookingRepository
            + InvoiceGenerator
            + 'static,
    {
        Self {
            payments: store.clone(),
            coupons: store.clone(),
            wallets: store.clone(),
            cards: store.clone(),
            subscriptions: store.clone(),
            bookings: store.clone(),
            invoices: store,
        }
    }
}
