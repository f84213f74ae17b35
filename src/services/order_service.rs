use std::collections::BTreeSet;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, audit_best_effort},
    dto::orders::{
        DiscountPreview, DiscountPreviewRequest, OrderList, OrderWithItems, PlaceOrderRequest,
        PlaceOrderResponse, ShippingInfo,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel, PaymentMethod},
    },
    error::{AppError, AppResult, CheckoutError, CheckoutResult},
    middleware::auth::AuthUser,
    models::{CartLine, Order, OrderItem},
    notifications::{Notification, notify_best_effort},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        cart_service::load_snapshot,
        discount::{self, AppliedDiscount},
        idempotency::{Admission, IdempotencyKey, InFlightGuard},
        inventory, payment_service,
        pricing::{OrderTotals, compute_totals},
    },
    state::AppState,
};

pub const ORDER_STATUS_PROCESSING: &str = "Processing";

/// Everything the placement transaction needs, already loaded by the caller.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    pub lines: Vec<CartLine>,
    pub shipping_amount: Decimal,
    pub discount_code: Option<String>,
    pub idempotency_key: Option<String>,
    pub external_payment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub replayed: bool,
    /// Absent for replays.
    pub totals: Option<OrderTotals>,
}

impl PlacedOrder {
    fn replayed(order_id: Uuid) -> Self {
        Self {
            order_id,
            replayed: true,
            totals: None,
        }
    }
}

/// Load the customer's cart (or selected rows) and place the order.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: PlaceOrderRequest,
) -> AppResult<ApiResponse<PlaceOrderResponse>> {
    if payload.shipping_amount < Decimal::ZERO {
        return Err(AppError::BadRequest("shipping_amount must not be negative".into()));
    }

    let lines = load_snapshot(&state.orm, user.user_id, payload.selected_items.as_deref()).await?;

    let placed = place_order(
        state,
        user,
        PlaceOrder {
            shipping: payload.shipping,
            payment_method: payload.payment_method,
            lines,
            shipping_amount: payload.shipping_amount,
            discount_code: payload.discount_code,
            idempotency_key: payload.idempotency_key,
            external_payment_id: payload.paypal_order_id,
        },
    )
    .await?;

    let message = if placed.replayed { "Order already placed" } else { "Order placed" };
    Ok(ApiResponse::success(
        message,
        PlaceOrderResponse {
            order_id: placed.order_id,
            replayed: placed.replayed,
        },
        Some(Meta::empty()),
    ))
}

/// Place an order atomically.
///
/// Before the transaction: idempotency admission, payment confirmation and
/// discount validation. Inside it: order row, stock reservation per line, order
/// lines, removal of the consumed cart rows. After commit, and never failing the
/// order: stock cache sync, discount redemption, token resolution, notification
/// and audit.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    request: PlaceOrder,
) -> CheckoutResult<PlacedOrder> {
    let result = place_order_inner(state, user, request).await;
    if let Err(err) = &result {
        match err {
            CheckoutError::AlreadyProcessing => {}
            CheckoutError::TransactionFailed(db_err) => {
                tracing::error!(error = %db_err, customer_id = %user.user_id, "order transaction failed");
                notify_best_effort(&state.pool, user.user_id, Notification::order_failed(&err.to_string())).await;
            }
            _ => {
                tracing::info!(error = %err, customer_id = %user.user_id, "order rejected");
                notify_best_effort(&state.pool, user.user_id, Notification::order_failed(&err.to_string())).await;
            }
        }
    }
    result
}

async fn place_order_inner(
    state: &AppState,
    user: &AuthUser,
    request: PlaceOrder,
) -> CheckoutResult<PlacedOrder> {
    let token = request
        .idempotency_key
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let guard = match &token {
        Some(token) => match admit(state, user, token).await? {
            Ok(guard) => Some(guard),
            Err(order_id) => return Ok(PlacedOrder::replayed(order_id)),
        },
        None => None,
    };

    if request.lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if let Some(line) = request.lines.iter().find(|line| line.quantity <= 0) {
        return Err(CheckoutError::InvalidQuantity {
            cart_row_id: line.cart_row_id,
        });
    }

    let external_payment_id = if request.payment_method.is_external() {
        let Some(payment_id) = request
            .external_payment_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            return Err(CheckoutError::PaymentNotConfirmed);
        };
        if !payment_service::is_confirmed(&state.orm, payment_id, user.user_id).await? {
            return Err(CheckoutError::PaymentNotConfirmed);
        }
        Some(payment_id.to_string())
    } else {
        None
    };

    let applied = match request
        .discount_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
    {
        Some(code) => Some(discount::validate(&state.orm, code, &request.lines).await?),
        None => None,
    };

    let discount_amount = applied.as_ref().map(|d| d.amount).unwrap_or(Decimal::ZERO);
    let totals = compute_totals(&request.lines, discount_amount, request.shipping_amount);

    let txn = state.orm.begin().await?;
    let written = write_order(
        &txn,
        user,
        &request,
        &totals,
        applied.as_ref(),
        external_payment_id,
        token,
    )
    .await;
    let order = match written {
        Ok(order) => {
            txn.commit().await?;
            order
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            return Err(err);
        }
    };

    tracing::info!(
        order_id = %order.id,
        customer_id = %user.user_id,
        total = %order.total,
        lines = request.lines.len(),
        "order placed"
    );

    if let Some(guard) = guard {
        guard.resolve(order.id);
    }
    after_commit(state, user, &request.lines, applied.as_ref(), &order).await;

    Ok(PlacedOrder {
        order_id: order.id,
        replayed: false,
        totals: Some(totals),
    })
}

/// `Ok(guard)` to proceed, `Err(order_id)` when the token already produced an order.
async fn admit(
    state: &AppState,
    user: &AuthUser,
    token: &str,
) -> CheckoutResult<Result<InFlightGuard, Uuid>> {
    let key = IdempotencyKey {
        customer_id: user.user_id,
        session_id: user.session_id.clone(),
        token: token.to_string(),
    };
    let guard = match state.idempotency.admit(key)? {
        Admission::Replay(order_id) => return Ok(Err(order_id)),
        Admission::Proceed(guard) => guard,
    };

    // Another instance, or this one before a restart, may already hold the order.
    let existing = Orders::find()
        .select_only()
        .column(OrderCol::Id)
        .filter(OrderCol::UserId.eq(user.user_id))
        .filter(OrderCol::SessionId.eq(user.session_id.as_str()))
        .filter(OrderCol::IdempotencyKey.eq(token))
        .into_tuple::<Uuid>()
        .one(&state.orm)
        .await?;
    match existing {
        Some(order_id) => {
            guard.resolve(order_id);
            Ok(Err(order_id))
        }
        None => Ok(Ok(guard)),
    }
}

async fn write_order(
    txn: &DatabaseTransaction,
    customer: &AuthUser,
    request: &PlaceOrder,
    totals: &OrderTotals,
    applied: Option<&AppliedDiscount>,
    external_payment_id: Option<String>,
    idempotency_key: Option<String>,
) -> CheckoutResult<OrderModel> {
    let shipping = &request.shipping;
    let payment_completed = external_payment_id.is_some();
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer.user_id),
        session_id: Set(Some(customer.session_id.clone())),
        first_name: Set(shipping.first_name.clone()),
        last_name: Set(shipping.last_name.clone()),
        address: Set(shipping.address.clone()),
        city: Set(shipping.city.clone()),
        province: Set(shipping.province.clone()),
        zip: Set(shipping.zip.clone()),
        phone: Set(shipping.phone.clone()),
        email: Set(shipping.email.clone()),
        payment_method: Set(request.payment_method),
        paypal_order_id: Set(external_payment_id),
        idempotency_key: Set(idempotency_key),
        discount_code: Set(applied.map(|d| d.code.clone())),
        subtotal: Set(totals.subtotal),
        discount_amount: Set(totals.discount),
        tax: Set(totals.tax),
        shipping_amount: Set(totals.shipping),
        total: Set(totals.total),
        status: Set(ORDER_STATUS_PROCESSING.to_string()),
        payment_completed: Set(payment_completed),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await
    .map_err(order_insert_error)?;

    let mut located = Vec::with_capacity(request.lines.len());
    for line in &request.lines {
        let variant = inventory::locate(
            txn,
            line.product_id,
            line.color.as_deref(),
            line.size.as_deref(),
            line.quantity,
        )
        .await?;
        located.push(variant);
    }

    let mut lock_order: Vec<usize> = (0..located.len()).collect();
    lock_order.sort_by(|&a, &b| located[a].cmp(&located[b]));
    for index in lock_order {
        inventory::reserve(txn, &located[index], request.lines[index].quantity).await?;
    }

    for (line, variant) in request.lines.iter().zip(located) {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            image_url: Set(line.image_url.clone()),
            color: Set(variant.color),
            size: Set(variant.size),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            created_at: NotSet,
        }
        .insert(txn)
        .await?;
    }

    let row_ids: Vec<Uuid> = request.lines.iter().map(|line| line.cart_row_id).collect();
    let deleted = CartItems::delete_many()
        .filter(CartCol::Id.is_in(row_ids.iter().copied()))
        .filter(CartCol::UserId.eq(customer.user_id))
        .exec(txn)
        .await?;
    if deleted.rows_affected != row_ids.len() as u64 {
        return Err(CheckoutError::CartChanged);
    }

    Ok(order)
}

fn order_insert_error(err: DbErr) -> CheckoutError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail))
            if detail.contains("uq_orders_paypal_order_id") =>
        {
            CheckoutError::PaymentAlreadyUsed
        }
        Some(SqlErr::UniqueConstraintViolation(detail))
            if detail.contains("uq_orders_idempotency_key") =>
        {
            CheckoutError::AlreadyProcessing
        }
        _ => CheckoutError::TransactionFailed(err),
    }
}

async fn after_commit(
    state: &AppState,
    user: &AuthUser,
    lines: &[CartLine],
    applied: Option<&AppliedDiscount>,
    order: &OrderModel,
) {
    let product_ids: Vec<Uuid> = lines
        .iter()
        .map(|line| line.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if let Err(err) = inventory::sync_product_stock(&state.pool, &product_ids).await {
        tracing::warn!(error = %err, order_id = %order.id, "product stock sync failed");
    }

    if let Some(applied) = applied {
        if let Err(err) = discount::record_redemption(&state.orm, applied.discount_id).await {
            tracing::warn!(error = %err, code = %applied.code, "discount redemption not recorded");
        }
    }

    notify_best_effort(
        &state.pool,
        user.user_id,
        Notification::order_placed(order.id, order.total),
    )
    .await;

    audit_best_effort(
        &state.pool,
        Some(user.user_id),
        AuditAction::OrderPlaced,
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "total": order.total,
            "discount_code": order.discount_code,
        }),
    )
    .await;
}

/// Price the cart with a discount code without redeeming it.
pub async fn preview_discount(
    state: &AppState,
    user: &AuthUser,
    payload: DiscountPreviewRequest,
) -> AppResult<ApiResponse<DiscountPreview>> {
    if payload.shipping_amount < Decimal::ZERO {
        return Err(AppError::BadRequest("shipping_amount must not be negative".into()));
    }
    let lines = load_snapshot(&state.orm, user.user_id, payload.selected_items.as_deref()).await?;
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart.into());
    }

    let applied = discount::validate(&state.orm, &payload.code, &lines).await?;
    let totals = compute_totals(&lines, applied.amount, payload.shipping_amount);

    Ok(ApiResponse::success(
        "Discount applied",
        DiscountPreview {
            code: applied.code,
            amount: totals.discount,
            eligible_subtotal: applied.eligible_subtotal,
            totals,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let Some(order) = order else {
        return Err(AppError::NotFound);
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        first_name: model.first_name,
        last_name: model.last_name,
        address: model.address,
        city: model.city,
        province: model.province,
        zip: model.zip,
        phone: model.phone,
        email: model.email,
        payment_method: model.payment_method,
        paypal_order_id: model.paypal_order_id,
        discount_code: model.discount_code,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        tax: model.tax,
        shipping_amount: model.shipping_amount,
        total: model.total,
        status: model.status,
        payment_completed: model.payment_completed,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        product_name: model.product_name,
        image_url: model.image_url,
        color: model.color,
        size: model.size,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
