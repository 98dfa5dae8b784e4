//! In-process store for local runs and tests.
//!
//! Wallet writes are serialized with one async mutex per wallet; intent
//! uniqueness checks run under a single lock so check-then-insert is atomic.

use crate::error::PaymentError;
use crate::models::{
    Booking, CardTopup, CardType, Coupon, Invoice, NewInvoice, NewWalletEntry, PaymentIntent,
    PaymentStatus, PaymentTarget, PaymentType, Subscription, TransitCard, Wallet,
    WalletTransaction,
};
use crate::services::repository::{
    BookingRepository, CardRepository, CouponRepository, InvoiceGenerator, PaymentRepository,
    SubscriptionRepository, WalletRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    intents: Mutex<HashMap<Uuid, PaymentIntent>>,
    coupons: DashMap<String, Coupon>,
    wallets: DashMap<i64, Wallet>,
    wallets_by_user: DashMap<i64, i64>,
    wallet_locks: DashMap<i64, Arc<tokio::sync::Mutex<()>>>,
    wallet_transactions: DashMap<i64, Vec<WalletTransaction>>,
    cards: DashMap<i64, TransitCard>,
    card_topups: DashMap<i64, Vec<CardTopup>>,
    subscriptions: DashMap<i64, Subscription>,
    bookings: DashMap<i64, Booking>,
    invoices: DashMap<Uuid, Invoice>,
    sequence: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock_intents(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, PaymentIntent>>, PaymentError> {
        self.intents
            .lock()
            .map_err(|_| PaymentError::Database(anyhow::anyhow!("intent store lock poisoned")))
    }

    fn wallet_lock(&self, wallet_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.wallet_locks
            .entry(wallet_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn insert_coupon(&self, coupon: Coupon) {
        self.coupons.insert(coupon.code.clone(), coupon);
    }

    pub fn insert_card(&self, card_id: i64, user_id: i64, card_type: CardType, balance: Decimal) {
        let now = Utc::now();
        self.cards.insert(
            card_id,
            TransitCard {
                card_id,
                user_id,
                card_number: format!("NOL{:012}", card_id),
                card_type,
                balance,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn insert_subscription(&self, subscription_id: i64, user_id: i64, price: Decimal) {
        self.subscriptions.insert(
            subscription_id,
            Subscription {
                subscription_id,
                user_id,
                price,
                status: "pending".to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn insert_booking(&self, booking_id: i64, user_id: i64, amount: Decimal) {
        self.bookings.insert(
            booking_id,
            Booking {
                booking_id,
                user_id,
                amount,
                status: "pending".to_string(),
                created_at: Utc::now(),
            },
        );
    }

    pub fn invoices_for(&self, intent_id: Uuid) -> Vec<Invoice> {
        self.invoices
            .iter()
            .filter(|i| i.intent_id == intent_id)
            .map(|i| i.value().clone())
            .collect()
    }
}

fn is_open_for(intent: &PaymentIntent, user_id: i64, target: PaymentTarget) -> bool {
    intent.status == PaymentStatus::Created && intent.user_id == user_id && intent.target == target
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_intent(&self, intent: &PaymentIntent) -> Result<(), PaymentError> {
        let mut intents = self.lock_intents()?;

        if !intent.payment_type().allows_concurrent_intents()
            && intents
                .values()
                .any(|existing| is_open_for(existing, intent.user_id, intent.target))
        {
            return Err(PaymentError::DuplicateIntent {
                payment_type: intent.payment_type(),
                target_id: intent.target.target_id(),
            });
        }
        if intents
            .values()
            .any(|existing| existing.gateway_order_id == intent.gateway_order_id)
        {
            return Err(PaymentError::Conflict(format!(
                "Gateway order {} is already recorded",
                intent.gateway_order_id
            )));
        }

        intents.insert(intent.intent_id, intent.clone());
        Ok(())
    }

    async fn find_open_intent(
        &self,
        user_id: i64,
        target: PaymentTarget,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        Ok(self
            .lock_intents()?
            .values()
            .find(|i| is_open_for(i, user_id, target))
            .cloned())
    }

    async fn get_intent(&self, intent_id: Uuid) -> Result<Option<PaymentIntent>, PaymentError> {
        Ok(self.lock_intents()?.get(&intent_id).cloned())
    }

    async fn get_intent_by_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        Ok(self
            .lock_intents()?
            .values()
            .find(|i| i.gateway_order_id == gateway_order_id)
            .cloned())
    }

    async fn transition(
        &self,
        intent_id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        gateway_payment_id: Option<&str>,
    ) -> Result<Option<PaymentIntent>, PaymentError> {
        let mut intents = self.lock_intents()?;

        if let Some(payment_id) = gateway_payment_id {
            let taken = intents.values().any(|i| {
                i.intent_id != intent_id && i.gateway_payment_id.as_deref() == Some(payment_id)
            });
            if taken {
                return Err(PaymentError::Conflict(format!(
                    "Gateway payment {} is already attached to another intent",
                    payment_id
                )));
            }
        }

        let Some(intent) = intents.get_mut(&intent_id) else {
            return Ok(None);
        };
        if intent.status != from {
            return Ok(None);
        }

        intent.status = to;
        if let Some(payment_id) = gateway_payment_id {
            intent.gateway_payment_id = Some(payment_id.to_string());
        }
        intent.updated_at = Utc::now();

        Ok(Some(intent.clone()))
    }
}

#[async_trait]
impl CouponRepository for InMemoryStore {
    async fn get_by_code(&self, code: &str) -> Result<Option<Coupon>, PaymentError> {
        Ok(self.coupons.get(code).map(|c| c.value().clone()))
    }

    async fn list_for_payment_type(
        &self,
        payment_type: PaymentType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Coupon>, PaymentError> {
        let mut coupons: Vec<Coupon> = self
            .coupons
            .iter()
            .filter(|c| c.is_active_at(now) && c.applies_to(payment_type))
            .map(|c| c.value().clone())
            .collect();
        coupons.sort_by_key(|c| c.coupon_id);
        Ok(coupons)
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn create_wallet(&self, user_id: i64) -> Result<Wallet, PaymentError> {
        let wallet_id = match self.wallets_by_user.entry(user_id) {
            Entry::Occupied(_) => {
                return Err(PaymentError::Conflict(format!(
                    "User {} already has a wallet",
                    user_id
                )))
            }
            Entry::Vacant(slot) => {
                let wallet_id = self.next_id();
                slot.insert(wallet_id);
                wallet_id
            }
        };

        let now = Utc::now();
        let wallet = Wallet {
            wallet_id,
            user_id,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        self.wallets.insert(wallet_id, wallet.clone());
        Ok(wallet)
    }

    async fn get_wallet(&self, wallet_id: i64) -> Result<Option<Wallet>, PaymentError> {
        Ok(self.wallets.get(&wallet_id).map(|w| w.value().clone()))
    }

    async fn get_wallet_by_user(&self, user_id: i64) -> Result<Option<Wallet>, PaymentError> {
        let wallet_id = self.wallets_by_user.get(&user_id).map(|w| *w.value());
        match wallet_id {
            Some(id) => self.get_wallet(id).await,
            None => Ok(None),
        }
    }

    async fn apply_entry(&self, entry: NewWalletEntry) -> Result<WalletTransaction, PaymentError> {
        let lock = self.wallet_lock(entry.wallet_id);
        let _guard = lock.lock().await;

        let mut wallet = self
            .wallets
            .get(&entry.wallet_id)
            .map(|w| w.value().clone())
            .ok_or_else(|| PaymentError::NotFound(format!("Wallet {}", entry.wallet_id)))?;

        let balance_after = wallet.balance + entry.amount;
        if balance_after < Decimal::ZERO {
            return Err(PaymentError::InsufficientFunds {
                balance: wallet.balance,
                requested: -entry.amount,
            });
        }

        let now = Utc::now();
        let transaction = WalletTransaction {
            transaction_id: self.next_id(),
            wallet_id: entry.wallet_id,
            amount: entry.amount,
            transaction_type: entry.transaction_type,
            admin_id: entry.admin_id,
            description: entry.description,
            balance_after,
            created_at: now,
        };

        wallet.balance = balance_after;
        wallet.updated_at = now;

        self.wallet_transactions
            .entry(entry.wallet_id)
            .or_default()
            .push(transaction.clone());
        self.wallets.insert(entry.wallet_id, wallet);

        Ok(transaction)
    }

    async fn list_transactions(
        &self,
        wallet_id: i64,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, PaymentError> {
        let Some(transactions) = self.wallet_transactions.get(&wallet_id) else {
            return Ok(Vec::new());
        };

        Ok(transactions
            .iter()
            .rev()
            .filter(|t| before.map_or(true, |cursor| t.transaction_id < cursor))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CardRepository for InMemoryStore {
    async fn get_card(&self, card_id: i64) -> Result<Option<TransitCard>, PaymentError> {
        Ok(self.cards.get(&card_id).map(|c| c.value().clone()))
    }

    async fn credit_card(
        &self,
        card_id: i64,
        amount: Decimal,
    ) -> Result<(TransitCard, CardTopup), PaymentError> {
        let now = Utc::now();
        let card = {
            let mut card = self
                .cards
                .get_mut(&card_id)
                .ok_or_else(|| PaymentError::NotFound(format!("Card {}", card_id)))?;
            card.balance += amount;
            card.updated_at = now;
            card.clone()
        };

        let topup = CardTopup {
            topup_id: self.next_id(),
            card_id,
            amount,
            created_at: now,
        };
        self.card_topups
            .entry(card_id)
            .or_default()
            .push(topup.clone());

        Ok((card, topup))
    }

    async fn list_topups(&self, card_id: i64) -> Result<Vec<CardTopup>, PaymentError> {
        Ok(self
            .card_topups
            .get(&card_id)
            .map(|t| t.value().clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn get_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<Option<Subscription>, PaymentError> {
        Ok(self
            .subscriptions
            .get(&subscription_id)
            .map(|s| s.value().clone()))
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn get_booking(&self, booking_id: i64) -> Result<Option<Booking>, PaymentError> {
        Ok(self.bookings.get(&booking_id).map(|b| b.value().clone()))
    }
}

#[async_trait]
impl InvoiceGenerator for InMemoryStore {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, PaymentError> {
        let invoice = invoice.into_invoice(Utc::now());
        self.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(user_id: i64, target: PaymentTarget, order: &str) -> PaymentIntent {
        let now = Utc::now();
        PaymentIntent {
            intent_id: Uuid::new_v4(),
            user_id,
            gateway_order_id: order.to_string(),
            gateway_payment_id: None,
            original_amount: Decimal::from(100),
            discount_amount: Decimal::ZERO,
            amount: Decimal::from(100),
            currency: "INR".to_string(),
            target,
            coupon_code: None,
            status: PaymentStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn rejects_second_open_intent_for_same_target() {
        let store = InMemoryStore::new();
        store
            .insert_intent(&intent(1, PaymentTarget::Booking(5), "order_1"))
            .await
            .unwrap();

        let err = store
            .insert_intent(&intent(1, PaymentTarget::Booking(5), "order_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::DuplicateIntent { .. }));

        store
            .insert_intent(&intent(1, PaymentTarget::WalletTopup(9), "order_3"))
            .await
            .unwrap();
        store
            .insert_intent(&intent(1, PaymentTarget::WalletTopup(9), "order_4"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryStore::new();
        let created = intent(1, PaymentTarget::Subscription(3), "order_1");
        store.insert_intent(&created).await.unwrap();

        let won = store
            .transition(
                created.intent_id,
                PaymentStatus::Created,
                PaymentStatus::Verified,
                Some("pay_1"),
            )
            .await
            .unwrap();
        assert_eq!(won.unwrap().gateway_payment_id.as_deref(), Some("pay_1"));

        let lost = store
            .transition(
                created.intent_id,
                PaymentStatus::Created,
                PaymentStatus::Verified,
                Some("pay_1"),
            )
            .await
            .unwrap();
        assert!(lost.is_none());
    }

    #[tokio::test]
    async fn gateway_payment_id_is_unique() {
        let store = InMemoryStore::new();
        let first = intent(1, PaymentTarget::Booking(1), "order_1");
        let second = intent(1, PaymentTarget::Booking(2), "order_2");
        store.insert_intent(&first).await.unwrap();
        store.insert_intent(&second).await.unwrap();

        store
            .transition(first.intent_id, PaymentStatus::Created, PaymentStatus::Verified, Some("pay_1"))
            .await
            .unwrap();

        let err = store
            .transition(second.intent_id, PaymentStatus::Created, PaymentStatus::Verified, Some("pay_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Conflict(_)));
    }
}
