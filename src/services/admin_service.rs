use std::collections::{HashMap, HashSet};

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, SqlErr, TransactionTrait,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::{AuditAction, audit_best_effort},
    dto::admin::{CreateDiscountRequest, DiscountList, InventoryAdjustRequest, LowStockQuery, VariantList},
    entity::{
        discount_code_products::{
            ActiveModel as ScopeActive, Column as ScopeCol, Entity as DiscountCodeProducts,
        },
        discount_codes::{
            ActiveModel as DiscountActive, Column as DiscountCol, DiscountKind, Entity as DiscountCodes,
            Model as DiscountModel,
        },
        product_variants::{
            ActiveModel as VariantActive, Column as VariantCol, Entity as ProductVariants,
            Model as VariantModel,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{DiscountCode, VariantStock},
    response::{ApiResponse, Meta},
    services::{discount::normalize_code, inventory::sync_product_stock},
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

pub async fn create_discount(
    state: &AppState,
    user: &AuthUser,
    payload: CreateDiscountRequest,
) -> AppResult<ApiResponse<DiscountCode>> {
    ensure_admin(user)?;
    payload.validate()?;
    check_discount_terms(&payload)?;

    let code = normalize_code(&payload.code);
    let product_ids: Vec<Uuid> = payload
        .product_ids
        .iter()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    if !product_ids.is_empty() {
        let found = Products::find()
            .select_only()
            .column(ProdCol::Id)
            .filter(ProdCol::Id.is_in(product_ids.iter().copied()))
            .into_tuple::<Uuid>()
            .all(&state.orm)
            .await?;
        if found.len() != product_ids.len() {
            return Err(AppError::BadRequest("unknown product in discount scope".into()));
        }
    }

    let txn = state.orm.begin().await?;
    let created = DiscountActive {
        id: Set(Uuid::new_v4()),
        code: Set(code.clone()),
        kind: Set(payload.kind),
        value: Set(payload.value),
        start_date: Set(payload.start_date.map(Into::into)),
        end_date: Set(payload.end_date.map(Into::into)),
        active: Set(true),
        min_order_amount: Set(payload.min_order_amount),
        max_uses: Set(payload.max_uses),
        uses: Set(0),
        created_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::BadRequest(format!("discount code {code} already exists"))
        }
        _ => AppError::OrmError(err),
    })?;

    for product_id in &product_ids {
        ScopeActive {
            discount_code_id: Set(created.id),
            product_id: Set(*product_id),
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    audit_best_effort(
        &state.pool,
        Some(user.user_id),
        AuditAction::DiscountCreated,
        "discount_codes",
        serde_json::json!({ "code": created.code, "kind": created.kind, "value": created.value }),
    )
    .await;

    Ok(ApiResponse::success(
        "Discount created",
        discount_from_entity(created, product_ids),
        Some(Meta::empty()),
    ))
}

fn check_discount_terms(payload: &CreateDiscountRequest) -> AppResult<()> {
    if payload.value <= Decimal::ZERO {
        return Err(AppError::BadRequest("value must be greater than 0".into()));
    }
    if payload.kind == DiscountKind::Percent && payload.value > dec!(100) {
        return Err(AppError::BadRequest("percent discount cannot exceed 100".into()));
    }
    if payload.min_order_amount < Decimal::ZERO {
        return Err(AppError::BadRequest("min_order_amount must not be negative".into()));
    }
    if let (Some(start), Some(end)) = (payload.start_date, payload.end_date) {
        if end < start {
            return Err(AppError::BadRequest("end_date is before start_date".into()));
        }
    }
    Ok(())
}

pub async fn list_discounts(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<DiscountList>> {
    ensure_admin(user)?;

    let codes = DiscountCodes::find()
        .order_by_desc(DiscountCol::CreatedAt)
        .all(&state.orm)
        .await?;

    let mut scopes: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    if !codes.is_empty() {
        let rows = DiscountCodeProducts::find()
            .filter(ScopeCol::DiscountCodeId.is_in(codes.iter().map(|c| c.id)))
            .all(&state.orm)
            .await?;
        for row in rows {
            scopes.entry(row.discount_code_id).or_default().push(row.product_id);
        }
    }

    let total = codes.len() as i64;
    let items = codes
        .into_iter()
        .map(|code| {
            let product_ids = scopes.remove(&code.id).unwrap_or_default();
            discount_from_entity(code, product_ids)
        })
        .collect();

    Ok(ApiResponse::success(
        "Discounts",
        DiscountList { items },
        Some(Meta::new(1, total, total)),
    ))
}

/// Restock or write off units of one variant. The result never goes below zero.
pub async fn adjust_variant_stock(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<VariantStock>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let variant = ProductVariants::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    let Some(variant) = variant else {
        return Err(AppError::NotFound);
    };

    let new_stock = variant.stock + payload.delta;
    if new_stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".into()));
    }

    let mut active: VariantActive = variant.into();
    active.stock = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = sync_product_stock(&state.pool, &[updated.product_id]).await {
        tracing::warn!(error = %err, product_id = %updated.product_id, "product stock sync failed");
    }

    audit_best_effort(
        &state.pool,
        Some(user.user_id),
        AuditAction::InventoryAdjust,
        "product_variants",
        serde_json::json!({ "variant_id": updated.id, "delta": payload.delta, "stock": updated.stock }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        variant_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<VariantList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination.normalize();

    let finder = ProductVariants::find()
        .filter(VariantCol::Stock.lte(threshold))
        .order_by_asc(VariantCol::Stock)
        .order_by_asc(VariantCol::ProductId);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(variant_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", VariantList { items }, Some(meta)))
}

fn discount_from_entity(model: DiscountModel, product_ids: Vec<Uuid>) -> DiscountCode {
    DiscountCode {
        id: model.id,
        code: model.code,
        kind: model.kind,
        value: model.value,
        start_date: model.start_date.map(|dt| dt.with_timezone(&Utc)),
        end_date: model.end_date.map(|dt| dt.with_timezone(&Utc)),
        active: model.active,
        min_order_amount: model.min_order_amount,
        max_uses: model.max_uses,
        uses: model.uses,
        product_ids,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn variant_from_entity(model: VariantModel) -> VariantStock {
    VariantStock {
        id: model.id,
        product_id: model.product_id,
        color: model.color,
        size: model.size,
        stock: model.stock,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn request(kind: DiscountKind, value: Decimal) -> CreateDiscountRequest {
        CreateDiscountRequest {
            code: "spring25".into(),
            kind,
            value,
            start_date: None,
            end_date: None,
            min_order_amount: Decimal::ZERO,
            max_uses: None,
            product_ids: Vec::new(),
        }
    }

    #[test]
    fn accepts_sane_terms() {
        assert!(check_discount_terms(&request(DiscountKind::Percent, dec!(25))).is_ok());
        assert!(check_discount_terms(&request(DiscountKind::Fixed, dec!(250))).is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(check_discount_terms(&request(DiscountKind::Percent, dec!(100.01))).is_err());
        assert!(check_discount_terms(&request(DiscountKind::Fixed, Decimal::ZERO)).is_err());

        let mut negative_minimum = request(DiscountKind::Fixed, dec!(5));
        negative_minimum.min_order_amount = dec!(-1);
        assert!(check_discount_terms(&negative_minimum).is_err());
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let mut inverted = request(DiscountKind::Percent, dec!(10));
        inverted.start_date = Some(now);
        inverted.end_date = Some(now - Duration::hours(1));
        assert!(matches!(
            check_discount_terms(&inverted),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn code_length_is_validated() {
        let mut short = request(DiscountKind::Percent, dec!(10));
        short.code = "AB".into();
        assert!(short.validate().is_err());
    }
}
