pub mod booking;
pub mod card;
pub mod coupon;
pub mod invoice;
pub mod payment;
pub mod subscription;
pub mod wallet;

pub use booking::Booking;
pub use card::{CardTopup, CardType, TransitCard};
pub use coupon::{Coupon, DiscountType};
pub use invoice::{Invoice, NewInvoice};
pub use payment::{PaymentIntent, PaymentStatus, PaymentTarget, PaymentType};
pub use subscription::Subscription;
pub use wallet::{NewWalletEntry, TransactionPage, Wallet, WalletTransaction, WalletTransactionType};

use rust_decimal::{Decimal, RoundingStrategy};

/// Round a money value to two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a major-unit amount (rupees) to the gateway's minor units (paise).
pub fn to_minor_units(amount: Decimal) -> Option<u64> {
    use rust_decimal::prelude::ToPrimitive;
    (round_money(amount) * Decimal::ONE_HUNDRED).to_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(90000, 2)), Some(90000));
        assert_eq!(to_minor_units(Decimal::new(1999, 2)), Some(1999));
        assert_eq!(to_minor_units(Decimal::from(100)), Some(10000));
        assert_eq!(to_minor_units(Decimal::from(-1)), None);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(12344, 3)), Decimal::new(1234, 2));
    }
}
