use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entity::orders::PaymentMethod,
    models::{Order, OrderItem},
    services::pricing::OrderTotals,
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ShippingInfo {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub province: String,
    #[validate(length(min = 1, max = 20))]
    pub zip: String,
    #[validate(length(min = 5, max = 32))]
    pub phone: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub shipping: ShippingInfo,
    pub payment_method: PaymentMethod,
    /// Cart row ids for a partial checkout; omitted means the whole cart.
    pub selected_items: Option<Vec<Uuid>>,
    #[serde(default)]
    pub shipping_amount: Decimal,
    pub discount_code: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
    pub paypal_order_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    /// True when an earlier attempt with the same idempotency key produced this order.
    pub replayed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DiscountPreviewRequest {
    pub code: String,
    pub selected_items: Option<Vec<Uuid>>,
    #[serde(default)]
    pub shipping_amount: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountPreview {
    pub code: String,
    pub amount: Decimal,
    pub eligible_subtotal: Decimal,
    pub totals: OrderTotals,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
