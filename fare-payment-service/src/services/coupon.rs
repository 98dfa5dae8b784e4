//! Coupon evaluation.

use crate::error::{CouponError, PaymentError};
use crate::models::{round_money, Coupon, DiscountType, PaymentType};
use crate::services::repository::CouponRepository;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Discount `coupon` grants on `base_amount` at `now`.
///
/// Never negative and never larger than `base_amount`.
pub fn evaluate(
    coupon: &Coupon,
    base_amount: Decimal,
    payment_type: PaymentType,
    now: DateTime<Utc>,
) -> Result<Decimal, PaymentError> {
    if !coupon.is_active_at(now) {
        return Err(CouponError::Expired(coupon.code.clone()).into());
    }

    if let Some(expected) = coupon.payment_type {
        if expected != payment_type {
            return Err(CouponError::TypeMismatch {
                code: coupon.code.clone(),
                expected,
                actual: payment_type,
            }
            .into());
        }
    }

    let base = base_amount.max(Decimal::ZERO);
    let value = coupon.discount_value.max(Decimal::ZERO);
    let discount = match coupon.discount_type {
        DiscountType::Fixed => value,
        DiscountType::Percentage => base * value / Decimal::ONE_HUNDRED,
    };

    Ok(round_money(discount).min(base))
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Decimal,
    pub final_amount: Decimal,
}

#[derive(Clone)]
pub struct CouponService {
    coupons: Arc<dyn CouponRepository>,
}

impl CouponService {
    pub fn new(coupons: Arc<dyn CouponRepository>) -> Self {
        Self { coupons }
    }

    /// Look the code up and evaluate it against the current time.
    #[instrument(skip(self))]
    pub async fn evaluate(
        &self,
        code: &str,
        base_amount: Decimal,
        payment_type: PaymentType,
    ) -> Result<Decimal, PaymentError> {
        let coupon = self
            .coupons
            .get_by_code(code)
            .await?
            .ok_or_else(|| CouponError::NotFound(code.to_string()))?;

        evaluate(&coupon, base_amount, payment_type, Utc::now())
    }

    pub async fn apply(
        &self,
        code: &str,
        amount: Decimal,
        payment_type: PaymentType,
    ) -> Result<AppliedCoupon, PaymentError> {
        let discount = self.evaluate(code, amount, payment_type).await?;

        Ok(AppliedCoupon {
            code: code.to_string(),
            discount,
            final_amount: amount - discount,
        })
    }

    /// Coupons a user could apply to a payment of this type right now.
    pub async fn applicable(&self, payment_type: PaymentType) -> Result<Vec<Coupon>, PaymentError> {
        self.coupons
            .list_for_payment_type(payment_type, Utc::now())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: DiscountType, value: i64, payment_type: Option<PaymentType>) -> Coupon {
        let now = Utc::now();
        Coupon {
            coupon_id: 1,
            code: "SAVE".to_string(),
            discount_type,
            discount_value: Decimal::from(value),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            payment_type,
            created_at: now,
        }
    }

    #[test]
    fn percentage_discount() {
        let c = coupon(DiscountType::Percentage, 10, None);
        let discount = evaluate(&c, Decimal::from(1000), PaymentType::WalletTopup, Utc::now()).unwrap();
        assert_eq!(discount, Decimal::from(100));
    }

    #[test]
    fn fixed_discount_is_capped_at_amount() {
        let c = coupon(DiscountType::Fixed, 500, None);
        let discount = evaluate(&c, Decimal::from(120), PaymentType::Booking, Utc::now()).unwrap();
        assert_eq!(discount, Decimal::from(120));
    }

    #[test]
    fn discount_never_exceeds_amount() {
        let amounts = [0i64, 1, 19, 100, 999, 1000, 25_000];
        let coupons = [
            coupon(DiscountType::Percentage, 0, None),
            coupon(DiscountType::Percentage, 33, None),
            coupon(DiscountType::Percentage, 100, None),
            coupon(DiscountType::Percentage, 250, None),
            coupon(DiscountType::Fixed, 50, None),
            coupon(DiscountType::Fixed, 100_000, None),
            coupon(DiscountType::Fixed, -5, None),
        ];

        for c in &coupons {
            for cents in amounts {
                let amount = Decimal::new(cents * 100 + 99, 2);
                let discount = evaluate(c, amount, PaymentType::CardTopup, Utc::now()).unwrap();
                assert!(discount <= amount, "{discount} > {amount}");
                assert!(discount >= Decimal::ZERO);
            }
        }
    }

    #[test]
    fn window_is_half_open() {
        let c = coupon(DiscountType::Fixed, 10, None);
        assert!(evaluate(&c, Decimal::from(100), PaymentType::Booking, c.valid_from).is_ok());
        assert!(matches!(
            evaluate(&c, Decimal::from(100), PaymentType::Booking, c.valid_until),
            Err(PaymentError::Coupon(CouponError::Expired(_)))
        ));
        assert!(matches!(
            evaluate(
                &c,
                Decimal::from(100),
                PaymentType::Booking,
                c.valid_from - Duration::seconds(1)
            ),
            Err(PaymentError::Coupon(CouponError::Expired(_)))
        ));
    }

    #[test]
    fn type_restricted_coupon_rejects_other_types() {
        let c = coupon(DiscountType::Fixed, 10, Some(PaymentType::Subscription));
        assert!(evaluate(&c, Decimal::from(100), PaymentType::Subscription, Utc::now()).is_ok());
        assert!(matches!(
            evaluate(&c, Decimal::from(100), PaymentType::WalletTopup, Utc::now()),
            Err(PaymentError::Coupon(CouponError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn percentage_rounds_to_two_places() {
        let c = coupon(DiscountType::Percentage, 15, None);
        let discount = evaluate(&c, Decimal::new(3333, 2), PaymentType::Booking, Utc::now()).unwrap();
        // 33.33 * 15% = 4.9995
        assert_eq!(discount, Decimal::new(500, 2));
    }
}
