use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddToCartRequest, CartList, UpdateCartRequest},
    error::AppResult,
    middleware::auth::{AuthUser, Customer},
    models::CartLine,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(cart_list).post(add_to_cart))
        .route("/{id}", delete(remove_from_cart).patch(update_cart_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Priced cart lines for the current user", body = ApiResponse<CartList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn cart_list(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartList>>> {
    let resp = cart_service::list_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Add units of a variant, merging with an existing row", body = ApiResponse<CartLine>),
        (status = 400, description = "Bad request"),
        (status = 403, description = "Account suspended"),
        (status = 409, description = "Variant ambiguous, unknown or out of stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    Customer(user): Customer,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    let resp = cart_service::add_to_cart(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/cart/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart row ID")
    ),
    request_body = UpdateCartRequest,
    responses(
        (status = 200, description = "Quantity replaced", body = ApiResponse<CartLine>),
        (status = 400, description = "Bad request"),
        (status = 404, description = "Cart item not found"),
        (status = 409, description = "Not enough stock for the new quantity"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    Customer(user): Customer,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartRequest>,
) -> AppResult<Json<ApiResponse<CartLine>>> {
    let resp = cart_service::update_quantity(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart row ID")
    ),
    responses(
        (status = 200, description = "OK", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::remove_from_cart(&state, &user, id).await?;
    Ok(Json(resp))
}
