use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::{
        discount_code_products::{Column as ScopeCol, Entity as DiscountCodeProducts},
        discount_codes::{Column as DiscountCol, DiscountKind, Entity as DiscountCodes, Model as DiscountModel},
    },
    error::{CheckoutError, CheckoutResult, DiscountRejection},
    models::CartLine,
    services::pricing::round_money,
};

/// A code that passed validation against a specific set of cart lines.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AppliedDiscount {
    pub discount_id: Uuid,
    pub code: String,
    pub amount: Decimal,
    pub eligible_subtotal: Decimal,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Check a loaded code against the cart and compute its amount.
///
/// `scope` is the set of product ids the code is restricted to; empty means
/// unscoped. Checks run in a fixed order and the first failure wins.
pub fn evaluate(
    code: &DiscountModel,
    scope: &HashSet<Uuid>,
    lines: &[CartLine],
    now: DateTime<Utc>,
) -> Result<Decimal, DiscountRejection> {
    if !code.active {
        return Err(DiscountRejection::Inactive);
    }
    if code.start_date.is_some_and(|start| now < start) {
        return Err(DiscountRejection::NotStarted);
    }
    if code.end_date.is_some_and(|end| now > end) {
        return Err(DiscountRejection::Expired);
    }
    if code.max_uses.is_some_and(|max| code.uses >= max) {
        return Err(DiscountRejection::MaxUsesReached);
    }

    let eligible_subtotal: Decimal = lines
        .iter()
        .filter(|line| scope.is_empty() || scope.contains(&line.product_id))
        .map(CartLine::line_total)
        .sum();

    let has_eligible = scope.is_empty() || lines.iter().any(|l| scope.contains(&l.product_id));
    if !has_eligible {
        return Err(DiscountRejection::NoEligibleItems);
    }
    if eligible_subtotal < code.min_order_amount {
        return Err(DiscountRejection::MinOrderNotMet {
            threshold: code.min_order_amount,
        });
    }

    let amount = match code.kind {
        DiscountKind::Percent => round_money(eligible_subtotal * code.value / dec!(100)),
        DiscountKind::Fixed => round_money(code.value),
    };

    Ok(amount.min(eligible_subtotal).max(Decimal::ZERO))
}

pub async fn find_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<DiscountModel>, sea_orm::DbErr> {
    DiscountCodes::find()
        .filter(DiscountCol::Code.eq(normalize_code(code)))
        .one(conn)
        .await
}

pub async fn load_scope<C: ConnectionTrait>(
    conn: &C,
    discount_id: Uuid,
) -> Result<HashSet<Uuid>, sea_orm::DbErr> {
    let scope = DiscountCodeProducts::find()
        .filter(ScopeCol::DiscountCodeId.eq(discount_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|row| row.product_id)
        .collect();
    Ok(scope)
}

/// Validate `code` against `lines`. Read-only: never touches the usage counter.
pub async fn validate<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    lines: &[CartLine],
) -> CheckoutResult<AppliedDiscount> {
    let Some(model) = find_code(conn, code).await? else {
        return Err(DiscountRejection::NotFound.into());
    };
    let scope = load_scope(conn, model.id).await?;
    let amount = evaluate(&model, &scope, lines, Utc::now()).map_err(CheckoutError::from)?;

    let eligible_subtotal = lines
        .iter()
        .filter(|line| scope.is_empty() || scope.contains(&line.product_id))
        .map(CartLine::line_total)
        .sum();

    Ok(AppliedDiscount {
        discount_id: model.id,
        code: model.code,
        amount,
        eligible_subtotal,
    })
}

/// Count one use of a code. Only call once the order holding it has committed.
pub async fn record_redemption<C: ConnectionTrait>(
    conn: &C,
    discount_id: Uuid,
) -> Result<(), sea_orm::DbErr> {
    DiscountCodes::update_many()
        .col_expr(DiscountCol::Uses, Expr::col(DiscountCol::Uses).add(1))
        .filter(DiscountCol::Id.eq(discount_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::services::pricing::tests::line;

    fn code(kind: DiscountKind, value: Decimal, min_order: Decimal) -> DiscountModel {
        DiscountModel {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            kind,
            value,
            start_date: None,
            end_date: None,
            active: true,
            min_order_amount: min_order,
            max_uses: None,
            uses: 0,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn percent_on_unscoped_cart() {
        let lines = vec![line(Uuid::new_v4(), 2, dec!(20.00))];
        let amount = evaluate(
            &code(DiscountKind::Percent, dec!(10), dec!(30)),
            &HashSet::new(),
            &lines,
            Utc::now(),
        );
        assert_eq!(amount, Ok(dec!(4.00)));
    }

    #[test]
    fn min_order_reports_threshold() {
        let lines = vec![line(Uuid::new_v4(), 2, dec!(20.00))];
        let result = evaluate(
            &code(DiscountKind::Percent, dec!(10), dec!(50)),
            &HashSet::new(),
            &lines,
            Utc::now(),
        );
        assert_eq!(
            result,
            Err(DiscountRejection::MinOrderNotMet {
                threshold: dec!(50)
            })
        );
    }

    #[test]
    fn scoped_code_ignores_other_products() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let scope: HashSet<Uuid> = [a, b].into_iter().collect();

        let only_c = vec![line(c, 1, dec!(100.00))];
        assert_eq!(
            evaluate(&code(DiscountKind::Percent, dec!(10), Decimal::ZERO), &scope, &only_c, Utc::now()),
            Err(DiscountRejection::NoEligibleItems)
        );

        let mixed = vec![line(a, 1, dec!(15.55)), line(c, 1, dec!(100.00))];
        assert_eq!(
            evaluate(&code(DiscountKind::Percent, dec!(10), Decimal::ZERO), &scope, &mixed, Utc::now()),
            Ok(dec!(1.56))
        );
    }

    #[test]
    fn minimum_is_checked_against_eligible_subtotal() {
        let a = Uuid::new_v4();
        let scope: HashSet<Uuid> = [a].into_iter().collect();
        let lines = vec![line(a, 1, dec!(10.00)), line(Uuid::new_v4(), 1, dec!(90.00))];
        assert!(matches!(
            evaluate(&code(DiscountKind::Fixed, dec!(5), dec!(20)), &scope, &lines, Utc::now()),
            Err(DiscountRejection::MinOrderNotMet { .. })
        ));
    }

    #[test]
    fn fixed_amount_is_clamped_to_eligible_subtotal() {
        let lines = vec![line(Uuid::new_v4(), 1, dec!(12.00))];
        assert_eq!(
            evaluate(&code(DiscountKind::Fixed, dec!(15.004), Decimal::ZERO), &HashSet::new(), &lines, Utc::now()),
            Ok(dec!(12.00))
        );
        assert_eq!(
            evaluate(&code(DiscountKind::Fixed, dec!(5.005), Decimal::ZERO), &HashSet::new(), &lines, Utc::now()),
            Ok(dec!(5.01))
        );
    }

    #[test]
    fn status_checks_run_in_order() {
        let lines = vec![line(Uuid::new_v4(), 1, dec!(10.00))];
        let now = Utc::now();
        let scope = HashSet::new();

        let mut inactive = code(DiscountKind::Fixed, dec!(1), dec!(1000));
        inactive.active = false;
        assert_eq!(evaluate(&inactive, &scope, &lines, now), Err(DiscountRejection::Inactive));

        let mut future = code(DiscountKind::Fixed, dec!(1), Decimal::ZERO);
        future.start_date = Some((now + Duration::days(1)).into());
        assert_eq!(evaluate(&future, &scope, &lines, now), Err(DiscountRejection::NotStarted));

        let mut expired = code(DiscountKind::Fixed, dec!(1), Decimal::ZERO);
        expired.end_date = Some((now - Duration::days(1)).into());
        assert_eq!(evaluate(&expired, &scope, &lines, now), Err(DiscountRejection::Expired));

        let mut used_up = code(DiscountKind::Fixed, dec!(1), Decimal::ZERO);
        used_up.max_uses = Some(3);
        used_up.uses = 3;
        assert_eq!(evaluate(&used_up, &scope, &lines, now), Err(DiscountRejection::MaxUsesReached));

        let mut open_window = code(DiscountKind::Fixed, dec!(1), Decimal::ZERO);
        open_window.start_date = Some((now - Duration::days(1)).into());
        open_window.max_uses = Some(3);
        open_window.uses = 2;
        assert_eq!(evaluate(&open_window, &scope, &lines, now), Ok(dec!(1)));
    }

    #[test]
    fn normalizes_codes() {
        assert_eq!(normalize_code("  save10 "), "SAVE10");
    }
}
