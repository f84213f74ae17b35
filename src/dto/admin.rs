use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    entity::discount_codes::DiscountKind,
    models::{DiscountCode, VariantStock},
    routes::params::Pagination,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateDiscountRequest {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_order_amount: Decimal,
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
    /// Products the code applies to; empty means all products.
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountList {
    pub items: Vec<DiscountCode>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LowStockQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub threshold: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VariantList {
    pub items: Vec<VariantStock>,
}
