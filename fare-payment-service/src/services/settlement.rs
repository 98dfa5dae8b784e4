//! Applies a verified payment to its target.

use crate::error::PaymentError;
use crate::models::{PaymentIntent, PaymentTarget};
use crate::services::card::CardTopups;
use crate::services::ledger::WalletLedger;
use crate::services::metrics::SETTLEMENTS_TOTAL;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

/// What settling an intent did.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Settlement {
    WalletCredited {
        wallet_id: i64,
        transaction_id: i64,
        amount: Decimal,
        balance_after: Decimal,
    },
    CardCredited {
        card_id: i64,
        topup_id: i64,
        amount: Decimal,
        balance_after: Decimal,
    },
    /// Subscriptions and bookings are settled by the verified intent itself.
    Acknowledged { payment_type: String, target_id: i64 },
}

#[derive(Clone)]
pub struct SettlementDispatcher {
    ledger: WalletLedger,
    cards: CardTopups,
}

impl SettlementDispatcher {
    pub fn new(ledger: WalletLedger, cards: CardTopups) -> Self {
        Self { ledger, cards }
    }

    /// Must run at most once per intent, after it moved to `verified`.
    #[instrument(skip(self, intent), fields(intent_id = %intent.intent_id, target = ?intent.target))]
    pub async fn dispatch(&self, intent: &PaymentIntent) -> Result<Settlement, PaymentError> {
        let result = match intent.target {
            PaymentTarget::WalletTopup(wallet_id) => {
                let description = format!("Top-up via payment {}", intent.gateway_order_id);
                self.ledger
                    .credit(wallet_id, intent.amount, &description)
                    .await
                    .map(|tx| Settlement::WalletCredited {
                        wallet_id,
                        transaction_id: tx.transaction_id,
                        amount: tx.amount,
                        balance_after: tx.balance_after,
                    })
            }
            PaymentTarget::CardTopup(card_id) => self
                .cards
                .credit(card_id, intent.amount)
                .await
                .map(|(card, topup)| Settlement::CardCredited {
                    card_id,
                    topup_id: topup.topup_id,
                    amount: topup.amount,
                    balance_after: card.balance,
                }),
            PaymentTarget::Subscription(id) | PaymentTarget::Booking(id) => {
                Ok(Settlement::Acknowledged {
                    payment_type: intent.payment_type().to_string(),
                    target_id: id,
                })
            }
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        SETTLEMENTS_TOTAL
            .with_label_values(&[intent.payment_type().as_str(), outcome])
            .inc();

        if let Ok(settlement) = &result {
            info!(?settlement, "Payment settled");
        }

        result
    }
}
