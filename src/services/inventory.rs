use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entity::product_variants::{Column as VariantCol, Entity as ProductVariants},
    error::{CheckoutError, CheckoutResult},
    models::VariantStock,
};

/// Size labels that conventionally mean "fits everyone".
pub const ONE_SIZE_LABELS: [&str; 5] = ["ONE", "ONESIZE", "OS", "FREE", "UNIV"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantResolution {
    Resolved { color: String, size: String },
    Ambiguous,
    NotFound,
}

/// One concrete variant row.
///
/// Ordering is the lock order for reservations: every placement takes its rows
/// sorted by `(product_id, color, size)`, so two placements sharing variants
/// wait on each other instead of deadlocking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariantKey {
    pub product_id: Uuid,
    pub color: String,
    pub size: String,
}

pub fn normalize_color(color: Option<&str>) -> Option<String> {
    color
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_lowercase)
}

pub fn normalize_size(size: Option<&str>) -> Option<String> {
    size.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
}

/// Pick the variant a cart line refers to when color and/or size were left out.
///
/// `variants` must all belong to the same product and be normalized (lowercase
/// color, uppercase size). Preference order when something is missing: the only
/// candidate with enough stock, then the only candidate at all, and, when both
/// attributes are missing, a unique one-size variant with enough stock.
pub fn resolve_variant(
    variants: &[VariantStock],
    color: Option<&str>,
    size: Option<&str>,
    quantity: i32,
) -> VariantResolution {
    let color = normalize_color(color);
    let size = normalize_size(size);

    let candidates: Vec<&VariantStock> = match (&color, &size) {
        (Some(c), Some(s)) => {
            return match variants.iter().find(|v| &v.color == c && &v.size == s) {
                Some(v) => resolved(v),
                None => VariantResolution::NotFound,
            };
        }
        (Some(c), None) => variants.iter().filter(|v| &v.color == c).collect(),
        (None, Some(s)) => variants.iter().filter(|v| &v.size == s).collect(),
        (None, None) => variants.iter().collect(),
    };

    if candidates.is_empty() {
        return VariantResolution::NotFound;
    }

    let sufficient: Vec<&VariantStock> = candidates
        .iter()
        .copied()
        .filter(|v| v.stock >= quantity)
        .collect();

    if let [only] = sufficient.as_slice() {
        return resolved(only);
    }
    if let [only] = candidates.as_slice() {
        return resolved(only);
    }

    if color.is_none() && size.is_none() {
        let one_size: Vec<&VariantStock> = sufficient
            .into_iter()
            .filter(|v| ONE_SIZE_LABELS.contains(&v.size.as_str()))
            .collect();
        if let [only] = one_size.as_slice() {
            return resolved(only);
        }
    }

    VariantResolution::Ambiguous
}

fn resolved(variant: &VariantStock) -> VariantResolution {
    VariantResolution::Resolved {
        color: variant.color.clone(),
        size: variant.size.clone(),
    }
}

pub async fn load_variants<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Vec<VariantStock>, sea_orm::DbErr> {
    let variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|v| VariantStock {
            id: v.id,
            product_id: v.product_id,
            color: v.color,
            size: v.size,
            stock: v.stock,
        })
        .collect();
    Ok(variants)
}

/// Resolve which variant a cart line takes its units from.
pub async fn locate<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    color: Option<&str>,
    size: Option<&str>,
    quantity: i32,
) -> CheckoutResult<VariantKey> {
    let variants = load_variants(conn, product_id).await?;
    match resolve_variant(&variants, color, size, quantity) {
        VariantResolution::Resolved { color, size } => Ok(VariantKey {
            product_id,
            color,
            size,
        }),
        VariantResolution::Ambiguous => Err(CheckoutError::VariantAmbiguous { product_id }),
        VariantResolution::NotFound => Err(CheckoutError::VariantNotFound { product_id }),
    }
}

/// Take `quantity` units from a located variant.
///
/// Must run inside the order transaction. The decrement is a single conditional
/// UPDATE guarded by `stock >= quantity`, so stock seen while locating is
/// re-checked under the row lock rather than trusted.
pub async fn reserve<C: ConnectionTrait>(
    txn: &C,
    variant: &VariantKey,
    quantity: i32,
) -> CheckoutResult<()> {
    let VariantKey {
        product_id,
        color,
        size,
    } = variant;

    let result = ProductVariants::update_many()
        .col_expr(VariantCol::Stock, Expr::col(VariantCol::Stock).sub(quantity))
        .col_expr(VariantCol::UpdatedAt, Expr::current_timestamp().into())
        .filter(VariantCol::ProductId.eq(*product_id))
        .filter(VariantCol::Color.eq(color.as_str()))
        .filter(VariantCol::Size.eq(size.as_str()))
        .filter(VariantCol::Stock.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let available = ProductVariants::find()
            .filter(VariantCol::ProductId.eq(*product_id))
            .filter(VariantCol::Color.eq(color.as_str()))
            .filter(VariantCol::Size.eq(size.as_str()))
            .one(txn)
            .await?
            .map(|v| v.stock)
            .unwrap_or(0);
        return Err(CheckoutError::InsufficientStock {
            product_id: *product_id,
            color: color.clone(),
            size: size.clone(),
            available,
        });
    }

    tracing::debug!(%product_id, %color, %size, quantity, "stock reserved");
    Ok(())
}

/// Recompute the cached `products.stock` column from variant rows.
pub async fn sync_product_stock(pool: &DbPool, product_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
    if product_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        r#"
        UPDATE products p
        SET stock = COALESCE(
            (SELECT SUM(v.stock) FROM product_variants v WHERE v.product_id = p.id),
            0
        )
        WHERE p.id = ANY($1)
        "#,
    )
    .bind(product_ids)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(color: &str, size: &str, stock: i32) -> VariantStock {
        VariantStock {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            color: color.into(),
            size: size.into(),
            stock,
        }
    }

    fn is(color: &str, size: &str) -> VariantResolution {
        VariantResolution::Resolved {
            color: color.into(),
            size: size.into(),
        }
    }

    #[test]
    fn explicit_pair_is_normalized_and_matched() {
        let variants = vec![variant("black", "M", 0), variant("black", "L", 3)];
        assert_eq!(
            resolve_variant(&variants, Some(" Black "), Some("m"), 1),
            is("black", "M")
        );
        assert_eq!(
            resolve_variant(&variants, Some("red"), Some("M"), 1),
            VariantResolution::NotFound
        );
    }

    #[test]
    fn color_only_prefers_single_size_with_stock() {
        let variants = vec![
            variant("black", "S", 0),
            variant("black", "M", 5),
            variant("white", "M", 9),
        ];
        assert_eq!(resolve_variant(&variants, Some("black"), None, 2), is("black", "M"));
    }

    #[test]
    fn color_only_falls_back_to_single_size() {
        let variants = vec![variant("black", "S", 0), variant("white", "M", 9)];
        assert_eq!(resolve_variant(&variants, Some("black"), None, 2), is("black", "S"));
    }

    #[test]
    fn color_only_with_several_stocked_sizes_is_ambiguous() {
        let variants = vec![variant("black", "S", 4), variant("black", "M", 5)];
        assert_eq!(
            resolve_variant(&variants, Some("black"), None, 1),
            VariantResolution::Ambiguous
        );
        assert_eq!(
            resolve_variant(&variants, Some("green"), None, 1),
            VariantResolution::NotFound
        );
    }

    #[test]
    fn size_only_is_symmetric() {
        let variants = vec![
            variant("black", "M", 1),
            variant("white", "M", 6),
            variant("white", "L", 6),
        ];
        assert_eq!(resolve_variant(&variants, None, Some("m"), 3), is("white", "M"));
        assert_eq!(
            resolve_variant(&variants, None, Some("M"), 1),
            VariantResolution::Ambiguous
        );
    }

    #[test]
    fn neither_given_uses_unique_stocked_variant() {
        let variants = vec![variant("black", "M", 0), variant("white", "L", 2)];
        assert_eq!(resolve_variant(&variants, None, None, 2), is("white", "L"));
    }

    #[test]
    fn neither_given_single_variant_even_without_stock() {
        let variants = vec![variant("black", "M", 0)];
        assert_eq!(resolve_variant(&variants, None, None, 1), is("black", "M"));
    }

    #[test]
    fn neither_given_prefers_one_size_label() {
        let variants = vec![
            variant("black", "M", 5),
            variant("white", "L", 5),
            variant("default", "ONESIZE", 5),
        ];
        assert_eq!(
            resolve_variant(&variants, None, None, 1),
            is("default", "ONESIZE")
        );
    }

    #[test]
    fn neither_given_without_hint_is_ambiguous() {
        let variants = vec![variant("black", "M", 5), variant("white", "L", 5)];
        assert_eq!(
            resolve_variant(&variants, None, None, 1),
            VariantResolution::Ambiguous
        );
        assert_eq!(resolve_variant(&[], None, None, 1), VariantResolution::NotFound);
    }

    #[test]
    fn variant_keys_sort_by_product_then_tuple() {
        let first = Uuid::from_u128(1);
        let second = Uuid::from_u128(2);
        let key = |product_id, color: &str, size: &str| VariantKey {
            product_id,
            color: color.into(),
            size: size.into(),
        };
        let mut keys = vec![
            key(second, "black", "M"),
            key(first, "red", "L"),
            key(first, "black", "S"),
            key(first, "black", "M"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                key(first, "black", "M"),
                key(first, "black", "S"),
                key(first, "red", "L"),
                key(second, "black", "M"),
            ]
        );
    }

    #[test]
    fn empty_strings_count_as_missing() {
        let variants = vec![variant("black", "M", 5)];
        assert_eq!(resolve_variant(&variants, Some(""), Some("  "), 1), is("black", "M"));
    }
}
