use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::CartLine;

/// Flat sales tax applied to the discounted subtotal.
pub const TAX_RATE: Decimal = dec!(0.12);

/// Round to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Unit price after a product-level promotion.
pub fn promo_unit_price(base_price: Decimal, promo_active: bool, promo_percent: Decimal) -> Decimal {
    if promo_active && promo_percent > Decimal::ZERO {
        round_money(base_price * (Decimal::ONE - promo_percent / dec!(100)))
    } else {
        base_price
    }
}

pub fn subtotal(lines: &[CartLine]) -> Decimal {
    lines.iter().map(CartLine::line_total).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

/// The discount is clamped to the subtotal and taken off the whole order,
/// whatever subset of lines it was computed on.
pub fn compute_totals(lines: &[CartLine], discount: Decimal, shipping: Decimal) -> OrderTotals {
    let subtotal = round_money(subtotal(lines));
    let discount = round_money(discount.clamp(Decimal::ZERO, subtotal));
    let taxable = subtotal - discount;
    let tax = round_money(taxable * TAX_RATE);
    let shipping = round_money(shipping);
    OrderTotals {
        subtotal,
        discount,
        tax,
        shipping,
        total: taxable + tax + shipping,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use uuid::Uuid;

    pub(crate) fn line(product_id: Uuid, quantity: i32, unit_price: Decimal) -> CartLine {
        CartLine {
            cart_row_id: Uuid::new_v4(),
            customer_id: Uuid::nil(),
            product_id,
            product_name: "Tee".into(),
            image_url: None,
            color: Some("black".into()),
            size: Some("M".into()),
            quantity,
            unit_price,
            original_unit_price: unit_price,
            promo_active: false,
            promo_percent: Decimal::ZERO,
        }
    }

    #[test]
    fn totals_without_discount() {
        let lines = vec![line(Uuid::new_v4(), 2, dec!(20.00))];
        let totals = compute_totals(&lines, Decimal::ZERO, dec!(5.00));
        assert_eq!(totals.subtotal, dec!(40.00));
        assert_eq!(totals.tax, dec!(4.80));
        assert_eq!(totals.total, dec!(49.80));
    }

    #[test]
    fn discount_reduces_taxable_amount() {
        let lines = vec![line(Uuid::new_v4(), 2, dec!(20.00))];
        let totals = compute_totals(&lines, dec!(4.00), Decimal::ZERO);
        assert_eq!(totals.discount, dec!(4.00));
        assert_eq!(totals.tax, dec!(4.32));
        assert_eq!(totals.total, dec!(40.32));
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let lines = vec![line(Uuid::new_v4(), 1, dec!(10.00))];
        let totals = compute_totals(&lines, dec!(25.00), dec!(3.00));
        assert_eq!(totals.discount, dec!(10.00));
        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.total, dec!(3.00));
    }

    #[test]
    fn promo_price_rounds_to_cents() {
        assert_eq!(promo_unit_price(dec!(19.99), true, dec!(15)), dec!(16.99));
        assert_eq!(promo_unit_price(dec!(19.99), false, dec!(15)), dec!(19.99));
        assert_eq!(promo_unit_price(dec!(19.99), true, Decimal::ZERO), dec!(19.99));
    }

    #[test]
    fn promo_midpoint_rounds_away_from_zero() {
        assert_eq!(promo_unit_price(dec!(10.05), true, dec!(50)), dec!(5.03));
    }
}
