//! Transit card top-ups.

use crate::error::PaymentError;
use crate::models::{CardTopup, TransitCard};
use crate::services::repository::CardRepository;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct CardTopups {
    cards: Arc<dyn CardRepository>,
}

impl CardTopups {
    pub fn new(cards: Arc<dyn CardRepository>) -> Self {
        Self { cards }
    }

    pub async fn get_card(&self, card_id: i64) -> Result<TransitCard, PaymentError> {
        self.cards
            .get_card(card_id)
            .await?
            .ok_or_else(|| PaymentError::NotFound(format!("Card {}", card_id)))
    }

    /// Check ownership and the card tier's minimum top-up.
    pub async fn validate_topup(
        &self,
        card_id: i64,
        user_id: i64,
        amount: Decimal,
    ) -> Result<TransitCard, PaymentError> {
        let card = self.get_card(card_id).await?;

        if card.user_id != user_id {
            return Err(PaymentError::Validation(format!(
                "Card {} does not belong to user {}",
                card_id, user_id
            )));
        }

        let minimum = card.card_type.minimum_topup();
        if amount < minimum {
            return Err(PaymentError::Validation(format!(
                "Minimum top-up for a {} card is {}",
                card.card_type.as_str(),
                minimum
            )));
        }

        Ok(card)
    }

    pub async fn credit(
        &self,
        card_id: i64,
        amount: Decimal,
    ) -> Result<(TransitCard, CardTopup), PaymentError> {
        let (card, topup) = self.cards.credit_card(card_id, amount).await?;
        info!(
            card_id,
            topup_id = topup.topup_id,
            amount = %amount,
            balance = %card.balance,
            "Card topped up"
        );
        Ok((card, topup))
    }

    pub async fn topups(&self, card_id: i64) -> Result<Vec<CardTopup>, PaymentError> {
        self.cards.list_topups(card_id).await
    }
}
