//! Payment order manager.
//!
//! Owns the intent state machine:
//! `created -> verified -> settled`, `created -> refunded` when a failed
//! verification was compensated, `created -> failed` when the gateway
//! reports the payment cannot be refunded.

use crate::error::PaymentError;
use crate::models::{
    round_money, to_minor_units, Invoice, NewInvoice, PaymentIntent, PaymentStatus, PaymentTarget,
    PaymentType,
};
use crate::services::card::CardTopups;
use crate::services::coupon::CouponService;
use crate::services::gateway::{GatewayPayment, GatewayRefund, PaymentGateway};
use crate::services::ledger::{validate_amount, WalletLedger};
use crate::services::metrics::{PAYMENT_INTENTS_TOTAL, REFUNDS_TOTAL, VERIFICATIONS_TOTAL};
use crate::services::repository::Repositories;
use crate::services::settlement::{Settlement, SettlementDispatcher};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    pub user_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub target: PaymentTarget,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedIntent {
    pub intent: PaymentIntent,
    pub gateway_key_id: String,
    pub invoice: Option<Invoice>,
    /// Set when the intent was stored but the invoice could not be produced.
    pub invoice_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedIntent {
    pub verified: bool,
    pub payment_type: PaymentType,
    pub intent: PaymentIntent,
    pub settlement: Settlement,
}

#[derive(Clone)]
pub struct PaymentOrderManager {
    repos: Repositories,
    gateway: Arc<dyn PaymentGateway>,
    coupons: CouponService,
    cards: CardTopups,
    dispatcher: SettlementDispatcher,
    ledger: WalletLedger,
}

impl PaymentOrderManager {
    pub fn new(repos: Repositories, gateway: Arc<dyn PaymentGateway>) -> Self {
        let ledger = WalletLedger::new(repos.wallets.clone());
        let cards = CardTopups::new(repos.cards.clone());
        Self {
            coupons: CouponService::new(repos.coupons.clone()),
            dispatcher: SettlementDispatcher::new(ledger.clone(), cards.clone()),
            cards,
            ledger,
            gateway,
            repos,
        }
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    pub fn coupons(&self) -> &CouponService {
        &self.coupons
    }

    #[instrument(skip(self, request), fields(user_id = request.user_id, target = ?request.target))]
    pub async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<CreatedIntent, PaymentError> {
        let payment_type = request.target.payment_type();
        let result = self.create_intent_inner(request).await;

        let outcome = match &result {
            Ok(_) => "created",
            Err(e) => e.kind(),
        };
        PAYMENT_INTENTS_TOTAL
            .with_label_values(&[payment_type.as_str(), outcome])
            .inc();

        result
    }

    async fn create_intent_inner(
        &self,
        request: CreateIntentRequest,
    ) -> Result<CreatedIntent, PaymentError> {
        let currency = request.currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(PaymentError::Validation("Currency is required".to_string()));
        }

        let requested = validate_amount(request.amount)?;
        let target = request.target;
        let payment_type = target.payment_type();
        let amount = self
            .resolve_target(request.user_id, target, requested)
            .await?;

        if !payment_type.allows_concurrent_intents() {
            if let Some(existing) = self
                .repos
                .payments
                .find_open_intent(request.user_id, target)
                .await?
            {
                warn!(existing_intent = %existing.intent_id, "Open intent already exists");
                return Err(PaymentError::DuplicateIntent {
                    payment_type,
                    target_id: target.target_id(),
                });
            }
        }

        let coupon_code = request
            .coupon_code
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let discount = match &coupon_code {
            Some(code) => self.coupons.evaluate(code, amount, payment_type).await?,
            None => Decimal::ZERO,
        };

        let net = round_money(amount - discount);
        if net <= Decimal::ZERO {
            return Err(PaymentError::AmountNonPositive);
        }

        let amount_minor = to_minor_units(net)
            .ok_or_else(|| PaymentError::Validation(format!("Amount {} is out of range", net)))?;

        let intent_id = Uuid::new_v4();
        let receipt = format!("rcpt_{}_{}", request.user_id, &intent_id.simple().to_string()[..12]);

        // Nothing is persisted unless the gateway accepted the order.
        let order = self
            .gateway
            .create_order(amount_minor, &currency, &receipt)
            .await?;

        let now = Utc::now();
        let intent = PaymentIntent {
            intent_id,
            user_id: request.user_id,
            gateway_order_id: order.id,
            gateway_payment_id: None,
            original_amount: amount,
            discount_amount: discount,
            amount: net,
            currency,
            target,
            coupon_code,
            status: PaymentStatus::Created,
            created_at: now,
            updated_at: now,
        };

        self.repos.payments.insert_intent(&intent).await?;

        info!(
            intent_id = %intent.intent_id,
            gateway_order_id = %intent.gateway_order_id,
            original_amount = %intent.original_amount,
            discount_amount = %intent.discount_amount,
            net_amount = %intent.amount,
            "Payment intent created"
        );

        let (invoice, invoice_error) = match self
            .repos
            .invoices
            .create_invoice(NewInvoice {
                user_id: intent.user_id,
                intent_id: intent.intent_id,
                original_amount: intent.original_amount,
                payment_type,
                discount_amount: intent.discount_amount,
            })
            .await
        {
            Ok(invoice) => (Some(invoice), None),
            Err(e) => {
                error!(intent_id = %intent.intent_id, error = %e, "Invoice generation failed");
                (None, Some(e.to_string()))
            }
        };

        Ok(CreatedIntent {
            intent,
            gateway_key_id: self.gateway.key_id().to_string(),
            invoice,
            invoice_error,
        })
    }

    /// Check the target exists and belongs to the user; returns the amount to
    /// charge before discounts. `requested` has already been validated.
    async fn resolve_target(
        &self,
        user_id: i64,
        target: PaymentTarget,
        requested: Decimal,
    ) -> Result<Decimal, PaymentError> {
        let amount = match target {
            PaymentTarget::WalletTopup(wallet_id) => {
                let wallet = self.ledger.get_wallet(wallet_id).await?;
                ensure_owner("Wallet", wallet_id, wallet.user_id, user_id)?;
                requested
            }
            PaymentTarget::CardTopup(card_id) => {
                self.cards.validate_topup(card_id, user_id, requested).await?;
                requested
            }
            PaymentTarget::Subscription(subscription_id) => {
                let subscription = self.subscription(subscription_id).await?;
                ensure_owner("Subscription", subscription_id, subscription.user_id, user_id)?;
                validate_amount(subscription.price)?
            }
            PaymentTarget::Booking(booking_id) => {
                let booking = self.booking(booking_id).await?;
                ensure_owner("Booking", booking_id, booking.user_id, user_id)?;
                requested
            }
        };

        Ok(amount)
    }

    /// Confirm a checkout callback and settle the payment exactly once.
    #[instrument(skip(self, signature))]
    pub async fn verify_intent(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<VerifiedIntent, PaymentError> {
        if !self.gateway.verify_signature(order_id, payment_id, signature)? {
            warn!("Payment signature verification failed");
            return Err(PaymentError::InvalidSignature);
        }

        let intent = self.get_by_order_id(order_id).await?;
        if intent.status != PaymentStatus::Created {
            return Err(PaymentError::AlreadyProcessed(order_id.to_string()));
        }

        let payment = self.gateway.fetch_payment(payment_id).await?;
        if payment.order_id.as_deref() != Some(order_id) {
            return Err(PaymentError::OrderMismatch {
                payment_id: payment_id.to_string(),
                expected: order_id.to_string(),
                actual: payment.order_id.unwrap_or_else(|| "none".to_string()),
            });
        }
        let expected = to_minor_units(intent.amount).unwrap_or_default();
        if payment.amount != expected {
            return Err(PaymentError::AmountMismatch {
                payment_id: payment_id.to_string(),
                expected,
                actual: payment.amount,
            });
        }
        if !payment.is_captured() {
            return Err(PaymentError::NotCaptured {
                payment_id: payment_id.to_string(),
                status: payment.status,
            });
        }

        // Only the caller that wins this transition may settle.
        let verified = self
            .repos
            .payments
            .transition(
                intent.intent_id,
                PaymentStatus::Created,
                PaymentStatus::Verified,
                Some(payment_id),
            )
            .await?
            .ok_or_else(|| PaymentError::AlreadyProcessed(order_id.to_string()))?;

        info!(intent_id = %verified.intent_id, "Payment verified");

        let settlement = self.dispatcher.dispatch(&verified).await.map_err(|e| {
            error!(
                intent_id = %verified.intent_id,
                error = %e,
                "Settlement failed; intent left verified for follow-up"
            );
            PaymentError::SettlementFailed {
                intent_id: verified.intent_id,
                reason: e.to_string(),
            }
        })?;

        let settled = match self
            .repos
            .payments
            .transition(
                verified.intent_id,
                PaymentStatus::Verified,
                PaymentStatus::Settled,
                None,
            )
            .await?
        {
            Some(settled) => settled,
            None => {
                warn!(intent_id = %verified.intent_id, "Intent changed state during settlement");
                self.get_status(verified.intent_id).await?
            }
        };

        Ok(VerifiedIntent {
            verified: true,
            payment_type: settled.payment_type(),
            intent: settled,
            settlement,
        })
    }

    /// Verify and, when verification fails on a payment the gateway may have
    /// captured, refund it.
    #[instrument(skip(self, signature))]
    pub async fn verify_with_compensation(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<VerifiedIntent, PaymentError> {
        let verification = match self.verify_intent(order_id, payment_id, signature).await {
            Ok(verified) => {
                VERIFICATIONS_TOTAL.with_label_values(&["settled"]).inc();
                return Ok(verified);
            }
            Err(e) => {
                VERIFICATIONS_TOTAL.with_label_values(&[e.kind()]).inc();
                e
            }
        };

        if !verification.is_verification_failure() {
            return Err(verification);
        }

        warn!(error = %verification, "Verification failed, attempting refund");

        match self.refund_unclaimed(order_id, payment_id).await {
            Ok(Some((payment_order_id, refund))) => {
                REFUNDS_TOTAL.with_label_values(&["ok"]).inc();
                if let Some(refunded_order) = payment_order_id {
                    self.close_open_intent(&refunded_order, PaymentStatus::Refunded)
                        .await;
                }
                Err(PaymentError::VerificationRefunded {
                    verification: Box::new(verification),
                    refund_id: refund.id,
                })
            }
            Ok(None) => {
                REFUNDS_TOTAL.with_label_values(&["skipped"]).inc();
                Err(verification)
            }
            Err(refund_error) => {
                REFUNDS_TOTAL.with_label_values(&[refund_error.kind()]).inc();
                error!(
                    verification_error = %verification,
                    refund_error = %refund_error,
                    "Refund after failed verification failed; manual follow-up required"
                );
                // Only a payment the gateway says cannot be refunded closes the
                // intent. A forged callback or a gateway outage leaves it open.
                if !matches!(verification, PaymentError::InvalidSignature)
                    && matches!(refund_error, PaymentError::NotEligible { .. })
                {
                    self.close_open_intent(order_id, PaymentStatus::Failed).await;
                }
                Err(PaymentError::RefundFailed {
                    verification: Box::new(verification),
                    refund: Box::new(refund_error),
                })
            }
        }
    }

    /// Refund a captured payment. Local intent status is left to the caller.
    pub async fn process_refund(&self, payment_id: &str) -> Result<GatewayRefund, PaymentError> {
        let payment = self.gateway.fetch_payment(payment_id).await?;
        self.refund(payment).await.map(|(_, refund)| refund)
    }

    /// Compensation refund. Returns `None` without touching the gateway when
    /// the payment's intent, or the callback's intent, has left `created`:
    /// that payment was settled or closed and is not ours to refund.
    async fn refund_unclaimed(
        &self,
        order_id: &str,
        payment_id: &str,
    ) -> Result<Option<(Option<String>, GatewayRefund)>, PaymentError> {
        let payment = self.gateway.fetch_payment(payment_id).await?;

        let mut orders = vec![order_id];
        if let Some(paid_order) = payment.order_id.as_deref() {
            if paid_order != order_id {
                orders.push(paid_order);
            }
        }

        for order in orders {
            if let Some(intent) = self.repos.payments.get_intent_by_order(order).await? {
                if intent.status != PaymentStatus::Created || intent.gateway_payment_id.is_some() {
                    warn!(
                        payment_id,
                        intent_id = %intent.intent_id,
                        status = %intent.status,
                        "Payment belongs to a processed intent; refund refused"
                    );
                    return Ok(None);
                }
            }
        }

        self.refund(payment).await.map(Some)
    }

    async fn refund(
        &self,
        payment: GatewayPayment,
    ) -> Result<(Option<String>, GatewayRefund), PaymentError> {
        if !payment.is_captured() {
            return Err(PaymentError::NotEligible {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        let refund = self.gateway.create_refund(&payment.id).await?;
        info!(payment_id = %payment.id, refund_id = %refund.id, "Payment refunded");

        Ok((payment.order_id, refund))
    }

    /// Move a still-open intent for `order_id` to a terminal status. Failures
    /// are logged; the gateway side effect already happened.
    async fn close_open_intent(&self, order_id: &str, status: PaymentStatus) {
        let intent = match self.repos.payments.get_intent_by_order(order_id).await {
            Ok(Some(intent)) if intent.status == PaymentStatus::Created => intent,
            Ok(_) => return,
            Err(e) => {
                error!(order_id, error = %e, "Failed to load intent for compensation");
                return;
            }
        };

        match self
            .repos
            .payments
            .transition(intent.intent_id, PaymentStatus::Created, status, None)
            .await
        {
            Ok(Some(_)) => info!(intent_id = %intent.intent_id, %status, "Intent closed"),
            Ok(None) => warn!(intent_id = %intent.intent_id, "Intent changed state before close"),
            Err(e) => error!(intent_id = %intent.intent_id, error = %e, "Failed to close intent"),
        }
    }

    pub async fn get_status(&self, intent_id: Uuid) -> Result<PaymentIntent, PaymentError> {
        self.repos
            .payments
            .get_intent(intent_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Payment intent {}", intent_id)))
    }

    pub async fn get_by_order_id(&self, order_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.repos
            .payments
            .get_intent_by_order(order_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Payment intent for order {}", order_id)))
    }

    /// Price the target dictates: subscription price or booking amount.
    pub async fn quote_amount(&self, target: PaymentTarget) -> Result<Decimal, PaymentError> {
        match target {
            PaymentTarget::Subscription(id) => Ok(self.subscription(id).await?.price),
            PaymentTarget::Booking(id) => Ok(self.booking(id).await?.amount),
            PaymentTarget::WalletTopup(_) | PaymentTarget::CardTopup(_) => {
                Err(PaymentError::Validation(format!(
                    "{} amounts are chosen by the user",
                    target.payment_type()
                )))
            }
        }
    }

    async fn subscription(
        &self,
        id: i64,
    ) -> Result<crate::models::Subscription, PaymentError> {
        self.repos
            .subscriptions
            .get_subscription(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Subscription {}", id)))
    }

    async fn booking(&self, id: i64) -> Result<crate::models::Booking, PaymentError> {
        self.repos
            .bookings
            .get_booking(id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Booking {}", id)))
    }
}

fn ensure_owner(kind: &str, id: i64, owner: i64, user_id: i64) -> Result<(), PaymentError> {
    if owner != user_id {
        return Err(PaymentError::Validation(format!(
            "{} {} does not belong to user {}",
            kind, id, user_id
        )));
    }
    Ok(())
}
