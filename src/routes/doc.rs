use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{CreateDiscountRequest, DiscountList, InventoryAdjustRequest, LowStockQuery, VariantList},
        cart::{AddToCartRequest, CartList, UpdateCartRequest},
        notifications::{MarkedRead, NotificationList, NotificationQuery},
        orders::{
            DiscountPreview, DiscountPreviewRequest, OrderList, OrderWithItems, PlaceOrderRequest,
            PlaceOrderResponse, ShippingInfo,
        },
        payments::{CaptureCallback, PaymentStatus},
    },
    entity::{discount_codes::DiscountKind, orders::PaymentMethod},
    error::{DiscountRejection, ErrorData},
    models::{CartLine, DiscountCode, Order, OrderItem, UserNotification, VariantStock},
    response::{ApiResponse, Meta},
    routes::{admin, cart, checkout, health, notifications, orders, params, payments},
    services::pricing::OrderTotals,
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        checkout::preview_discount,
        checkout::place_order,
        orders::list_orders,
        orders::get_order,
        payments::capture,
        payments::status,
        notifications::list_notifications,
        notifications::mark_read,
        notifications::mark_all_read,
        admin::list_discounts,
        admin::create_discount,
        admin::list_low_stock,
        admin::adjust_variant_stock
    ),
    components(
        schemas(
            CartLine,
            Order,
            OrderItem,
            DiscountCode,
            VariantStock,
            PaymentMethod,
            DiscountKind,
            DiscountRejection,
            ErrorData,
            OrderTotals,
            ShippingInfo,
            AddToCartRequest,
            CartList,
            UpdateCartRequest,
            UserNotification,
            NotificationQuery,
            NotificationList,
            MarkedRead,
            PlaceOrderRequest,
            PlaceOrderResponse,
            DiscountPreviewRequest,
            DiscountPreview,
            OrderList,
            OrderWithItems,
            CaptureCallback,
            PaymentStatus,
            CreateDiscountRequest,
            DiscountList,
            InventoryAdjustRequest,
            LowStockQuery,
            VariantList,
            params::Pagination,
            params::OrderListQuery,
            Meta,
            ApiResponse<CartList>,
            ApiResponse<PlaceOrderResponse>,
            ApiResponse<DiscountPreview>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<PaymentStatus>,
            ApiResponse<DiscountList>,
            ApiResponse<VariantList>,
            ApiResponse<NotificationList>,
            ApiResponse<MarkedRead>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Checkout", description = "Discount preview and order placement"),
        (name = "Orders", description = "Order history endpoints"),
        (name = "Payments", description = "External payment confirmation"),
        (name = "Notifications", description = "Customer notification inbox"),
        (name = "Admin", description = "Discount and inventory administration"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
