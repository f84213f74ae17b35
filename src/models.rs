use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{discount_codes::DiscountKind, orders::PaymentMethod};

/// One priced cart row. `unit_price` already has any product promotion applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CartLine {
    pub cart_row_id: Uuid,
    pub customer_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub image_url: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub original_unit_price: Decimal,
    pub promo_active: bool,
    pub promo_percent: Decimal,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VariantStock {
    pub id: Uuid,
    pub product_id: Uuid,
    pub color: String,
    pub size: String,
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountCode {
    pub id: Uuid,
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub min_order_amount: Decimal,
    pub max_uses: Option<i32>,
    pub uses: i32,
    /// Empty means the code applies to every product.
    pub product_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub zip: String,
    pub phone: String,
    pub email: String,
    pub payment_method: PaymentMethod,
    pub paypal_order_id: Option<String>,
    pub discount_code: Option<String>,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax: Decimal,
    pub shipping_amount: Decimal,
    pub total: Decimal,
    pub status: String,
    pub payment_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub image_url: Option<String>,
    pub color: String,
    pub size: String,
    pub quantity: i32,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// An entry in the customer's notification inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserNotification {
    pub id: Uuid,
    pub title: String,
    pub body: Option<String>,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
