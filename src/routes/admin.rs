use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use uuid::Uuid;

use crate::{
    dto::admin::{CreateDiscountRequest, DiscountList, InventoryAdjustRequest, LowStockQuery, VariantList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{DiscountCode, VariantStock},
    response::ApiResponse,
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discounts", get(list_discounts).post(create_discount))
        .route("/variants/low-stock", get(list_low_stock))
        .route("/variants/{id}/stock", patch(adjust_variant_stock))
}

#[utoipa::path(
    get,
    path = "/api/admin/discounts",
    responses(
        (status = 200, description = "All discount codes with their product scope", body = ApiResponse<DiscountList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_discounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<DiscountList>>> {
    let resp = admin_service::list_discounts(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/discounts",
    request_body = CreateDiscountRequest,
    responses(
        (status = 200, description = "Create a discount code", body = ApiResponse<DiscountCode>),
        (status = 400, description = "Invalid terms or duplicate code"),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateDiscountRequest>,
) -> AppResult<Json<ApiResponse<DiscountCode>>> {
    let resp = admin_service::create_discount(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/variants/low-stock",
    params(
        ("threshold" = Option<i32>, Query, description = "Stock threshold, default 5"),
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Variants at or below the threshold", body = ApiResponse<VariantList>),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<ApiResponse<VariantList>>> {
    let resp = admin_service::list_low_stock(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/variants/{id}/stock",
    params(
        ("id" = Uuid, Path, description = "Variant ID")
    ),
    request_body = InventoryAdjustRequest,
    responses(
        (status = 200, description = "Adjust variant stock", body = ApiResponse<VariantStock>),
        (status = 400, description = "Invalid adjustment"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_variant_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<InventoryAdjustRequest>,
) -> AppResult<Json<ApiResponse<VariantStock>>> {
    let resp = admin_service::adjust_variant_stock(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
