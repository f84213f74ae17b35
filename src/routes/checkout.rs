use axum::{Json, Router, extract::State, routing::post};
use validator::Validate;

use crate::{
    dto::orders::{DiscountPreview, DiscountPreviewRequest, PlaceOrderRequest, PlaceOrderResponse},
    error::AppResult,
    middleware::auth::Customer,
    response::ApiResponse,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discount/preview", post(preview_discount))
        .route("/place-order", post(place_order))
}

#[utoipa::path(
    post,
    path = "/api/checkout/discount/preview",
    request_body = DiscountPreviewRequest,
    responses(
        (status = 200, description = "Totals with the code applied; the code is not redeemed", body = ApiResponse<DiscountPreview>),
        (status = 400, description = "Empty cart selection"),
        (status = 422, description = "Code rejected; `details.reason` says why"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn preview_discount(
    State(state): State<AppState>,
    Customer(user): Customer,
    Json(payload): Json<DiscountPreviewRequest>,
) -> AppResult<Json<ApiResponse<DiscountPreview>>> {
    let resp = order_service::preview_discount(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/checkout/place-order",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Order placed, or the order an earlier attempt with the same idempotency key produced", body = ApiResponse<PlaceOrderResponse>),
        (status = 400, description = "Invalid shipping details, empty cart or bad quantity"),
        (status = 402, description = "External payment not confirmed"),
        (status = 403, description = "Account suspended"),
        (status = 409, description = "Stock, variant, cart or idempotency conflict"),
        (status = 422, description = "Discount code rejected"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn place_order(
    State(state): State<AppState>,
    Customer(user): Customer,
    Json(payload): Json<PlaceOrderRequest>,
) -> AppResult<Json<ApiResponse<PlaceOrderResponse>>> {
    payload.validate()?;
    let resp = order_service::checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}
