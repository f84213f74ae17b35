use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, audit_best_effort},
    dto::cart::{AddToCartRequest, CartList, UpdateCartRequest},
    entity::{
        cart_items::{ActiveModel as CartActive, Column as CartCol, Entity as CartItems, Model as CartModel},
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult, CheckoutError},
    middleware::auth::AuthUser,
    models::{CartLine, VariantStock},
    response::{ApiResponse, Meta},
    services::{
        inventory::{VariantResolution, load_variants, normalize_color, normalize_size, resolve_variant},
        pricing::{promo_unit_price, subtotal},
    },
    state::AppState,
};

/// Priced projection of a customer's cart.
///
/// With `selection`, only those row ids owned by the customer are returned and
/// unknown ids are dropped. An empty result is returned as-is; callers treat it
/// as an error rather than widening to the whole cart.
pub async fn load_snapshot<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    selection: Option<&[Uuid]>,
) -> Result<Vec<CartLine>, sea_orm::DbErr> {
    let mut condition = Condition::all().add(CartCol::UserId.eq(customer_id));
    if let Some(ids) = selection {
        condition = condition.add(CartCol::Id.is_in(ids.iter().copied()));
    }

    let rows = CartItems::find()
        .filter(condition)
        .order_by_desc(CartCol::CreatedAt)
        .order_by_asc(CartCol::Id)
        .find_also_related(Products)
        .all(conn)
        .await?;

    let lines = rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|product| cart_line(item, product)))
        .collect();
    Ok(lines)
}

fn cart_line(item: CartModel, product: ProductModel) -> CartLine {
    CartLine {
        cart_row_id: item.id,
        customer_id: item.user_id,
        product_id: product.id,
        product_name: product.name,
        image_url: product.image_url,
        color: item.color,
        size: item.size,
        quantity: item.quantity,
        unit_price: promo_unit_price(product.price, product.promo_active, product.promo_percent),
        original_unit_price: product.price,
        promo_active: product.promo_active,
        promo_percent: product.promo_percent,
    }
}

pub async fn list_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartList>> {
    let items = load_snapshot(&state.orm, user.user_id, None).await?;
    let total = items.len() as i64;
    let subtotal = subtotal(&items);
    Ok(ApiResponse::success(
        "OK",
        CartList { items, subtotal },
        Some(Meta::new(1, total, total)),
    ))
}

/// Add units of a product variant, merging into an existing row for the same variant.
///
/// A missing color or size is resolved against the product's variants. The
/// resulting quantity is capped by that variant's stock; stock itself is only
/// taken when the order is placed.
pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartLine>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let Some(product) = Products::find_by_id(payload.product_id).one(&state.orm).await? else {
        return Err(AppError::BadRequest("product not found".to_string()));
    };

    let variants = load_variants(&state.orm, product.id).await?;
    let color = normalize_color(payload.color.as_deref());
    let size = normalize_size(payload.size.as_deref());
    let (color, size, available) = variant_with_stock(
        &variants,
        product.id,
        color.as_deref(),
        size.as_deref(),
        payload.quantity,
    )?;

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(product.id))
                .add(CartCol::Color.eq(color.as_str()))
                .add(CartCol::Size.eq(size.as_str())),
        )
        .one(&state.orm)
        .await?;

    let in_cart = existing.as_ref().map(|item| item.quantity).unwrap_or(0);
    if in_cart + payload.quantity > available {
        return Err(CheckoutError::InsufficientStock {
            product_id: product.id,
            color,
            size,
            available: (available - in_cart).max(0),
        }
        .into());
    }

    let item = match existing {
        Some(item) => {
            let quantity = item.quantity + payload.quantity;
            let mut active: CartActive = item.into();
            active.quantity = Set(quantity);
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(product.id),
                color: Set(Some(color)),
                size: Set(Some(size)),
                quantity: Set(payload.quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    audit_best_effort(
        &state.pool,
        Some(user.user_id),
        AuditAction::CartUpdate,
        "cart_items",
        serde_json::json!({ "product_id": item.product_id, "quantity": item.quantity }),
    )
    .await;

    Ok(ApiResponse::success("OK", cart_line(item, product), None))
}

/// Set the quantity of one cart row, capped by its variant's stock.
pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    cart_row_id: Uuid,
    payload: UpdateCartRequest,
) -> AppResult<ApiResponse<CartLine>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let row = CartItems::find()
        .filter(CartCol::Id.eq(cart_row_id))
        .filter(CartCol::UserId.eq(user.user_id))
        .find_also_related(Products)
        .one(&state.orm)
        .await?;
    let Some((item, Some(product))) = row else {
        return Err(AppError::NotFound);
    };

    let variants = load_variants(&state.orm, product.id).await?;
    let (color, size, available) = variant_with_stock(
        &variants,
        product.id,
        item.color.as_deref(),
        item.size.as_deref(),
        payload.quantity,
    )?;
    if payload.quantity > available {
        return Err(CheckoutError::InsufficientStock {
            product_id: product.id,
            color,
            size,
            available,
        }
        .into());
    }

    let mut active: CartActive = item.into();
    active.quantity = Set(payload.quantity);
    let item = active.update(&state.orm).await?;

    audit_best_effort(
        &state.pool,
        Some(user.user_id),
        AuditAction::CartUpdate,
        "cart_items",
        serde_json::json!({ "cart_row_id": item.id, "quantity": item.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Cart updated", cart_line(item, product), None))
}

/// Resolve a variant of `product_id` and report its current stock.
fn variant_with_stock(
    variants: &[VariantStock],
    product_id: Uuid,
    color: Option<&str>,
    size: Option<&str>,
    quantity: i32,
) -> AppResult<(String, String, i32)> {
    let (color, size) = match resolve_variant(variants, color, size, quantity) {
        VariantResolution::Resolved { color, size } => (color, size),
        VariantResolution::Ambiguous => {
            return Err(CheckoutError::VariantAmbiguous { product_id }.into());
        }
        VariantResolution::NotFound => {
            return Err(CheckoutError::VariantNotFound { product_id }.into());
        }
    };
    let available = variants
        .iter()
        .find(|v| v.color == color && v.size == size)
        .map(|v| v.stock)
        .unwrap_or(0);
    Ok((color, size, available))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    cart_row_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(CartCol::Id.eq(cart_row_id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit_best_effort(
        &state.pool,
        Some(user.user_id),
        AuditAction::CartRemove,
        "cart_items",
        serde_json::json!({ "cart_row_id": cart_row_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn product(price: rust_decimal::Decimal, promo_active: bool, promo_percent: rust_decimal::Decimal) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            name: "Ferris Tee".into(),
            description: None,
            image_url: Some("/img/tee.png".into()),
            price,
            stock: 10,
            promo_active,
            promo_percent,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn item(product_id: Uuid, quantity: i32) -> CartModel {
        CartModel {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            product_id,
            color: Some("black".into()),
            size: None,
            quantity,
            created_at: chrono::Utc::now().into(),
        }
    }

    #[test]
    fn promo_price_is_resolved_at_read_time() {
        let product = product(dec!(20.00), true, dec!(25));
        let line = cart_line(item(product.id, 2), product);
        assert_eq!(line.unit_price, dec!(15.00));
        assert_eq!(line.original_unit_price, dec!(20.00));
        assert_eq!(line.line_total(), dec!(30.00));
        assert_eq!(line.size, None);
    }

    #[test]
    fn stock_is_reported_for_the_resolved_variant() {
        let product_id = Uuid::new_v4();
        let variants = vec![
            VariantStock {
                id: Uuid::new_v4(),
                product_id,
                color: "black".into(),
                size: "M".into(),
                stock: 4,
            },
            VariantStock {
                id: Uuid::new_v4(),
                product_id,
                color: "black".into(),
                size: "L".into(),
                stock: 0,
            },
        ];
        let (color, size, available) =
            variant_with_stock(&variants, product_id, Some("black"), None, 2).unwrap();
        assert_eq!((color.as_str(), size.as_str(), available), ("black", "M", 4));

        let missing = variant_with_stock(&variants, product_id, Some("red"), Some("M"), 1);
        assert!(matches!(
            missing,
            Err(AppError::Checkout(CheckoutError::VariantNotFound { .. }))
        ));
    }

    #[test]
    fn inactive_promo_keeps_list_price() {
        let product = product(dec!(20.00), false, dec!(25));
        let line = cart_line(item(product.id, 1), product);
        assert_eq!(line.unit_price, dec!(20.00));
    }
}
