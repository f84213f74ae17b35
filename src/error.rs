use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::response::{ApiResponse, Meta};

/// Why a discount code was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, ToSchema)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscountRejection {
    #[error("discount code not found")]
    NotFound,
    #[error("discount code is inactive")]
    Inactive,
    #[error("discount code is not active yet")]
    NotStarted,
    #[error("discount code has expired")]
    Expired,
    #[error("discount code has reached its usage limit")]
    MaxUsesReached,
    #[error("order does not meet the minimum amount of {threshold} for this code")]
    MinOrderNotMet {
        #[schema(value_type = String)]
        threshold: Decimal,
    },
    #[error("no items in the order are eligible for this code")]
    NoEligibleItems,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Insufficient stock for product {product_id} ({color}/{size}), available {available}")]
    InsufficientStock {
        product_id: Uuid,
        color: String,
        size: String,
        available: i32,
    },

    #[error("Please choose a color and size for product {product_id}")]
    VariantAmbiguous { product_id: Uuid },

    #[error("Selected variant does not exist for product {product_id}")]
    VariantNotFound { product_id: Uuid },

    #[error("Discount rejected: {0}")]
    DiscountInvalid(DiscountRejection),

    #[error("Payment has not been confirmed")]
    PaymentNotConfirmed,

    #[error("Payment was already used for another order")]
    PaymentAlreadyUsed,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart has invalid quantity")]
    InvalidQuantity { cart_row_id: Uuid },

    #[error("Cart changed while the order was being placed")]
    CartChanged,

    #[error("Order is already being processed")]
    AlreadyProcessing,

    #[error("Order could not be saved")]
    TransactionFailed(#[from] sea_orm::DbErr),
}

impl CheckoutError {
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::VariantAmbiguous { .. } => "variant_ambiguous",
            CheckoutError::VariantNotFound { .. } => "variant_not_found",
            CheckoutError::DiscountInvalid(_) => "discount_invalid",
            CheckoutError::PaymentNotConfirmed => "payment_not_confirmed",
            CheckoutError::PaymentAlreadyUsed => "payment_already_used",
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::InvalidQuantity { .. } => "invalid_quantity",
            CheckoutError::CartChanged => "cart_changed",
            CheckoutError::AlreadyProcessing => "already_processing",
            CheckoutError::TransactionFailed(_) => "transaction_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CheckoutError::InsufficientStock { .. }
            | CheckoutError::VariantAmbiguous { .. }
            | CheckoutError::VariantNotFound { .. }
            | CheckoutError::CartChanged
            | CheckoutError::PaymentAlreadyUsed
            | CheckoutError::AlreadyProcessing => StatusCode::CONFLICT,
            CheckoutError::DiscountInvalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CheckoutError::PaymentNotConfirmed => StatusCode::PAYMENT_REQUIRED,
            CheckoutError::EmptyCart | CheckoutError::InvalidQuantity { .. } => {
                StatusCode::BAD_REQUEST
            }
            CheckoutError::TransactionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable payload so the caller can name the offending item.
    pub fn details(&self) -> Value {
        match self {
            CheckoutError::InsufficientStock {
                product_id,
                color,
                size,
                available,
            } => json!({
                "code": self.code(),
                "product_id": product_id,
                "color": color,
                "size": size,
                "available": available,
            }),
            CheckoutError::VariantAmbiguous { product_id }
            | CheckoutError::VariantNotFound { product_id } => {
                json!({ "code": self.code(), "product_id": product_id })
            }
            CheckoutError::DiscountInvalid(rejection) => {
                json!({ "code": self.code(), "discount": rejection })
            }
            CheckoutError::InvalidQuantity { cart_row_id } => {
                json!({ "code": self.code(), "cart_row_id": cart_row_id })
            }
            _ => json!({ "code": self.code() }),
        }
    }
}

impl From<DiscountRejection> for CheckoutError {
    fn from(rejection: DiscountRejection) -> Self {
        CheckoutError::DiscountInvalid(rejection)
    }
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Service Unavailable")]
    ServiceUnavailable(String),

    #[error("Validation failed")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    Checkout(#[from] CheckoutError),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl From<DiscountRejection> for AppError {
    fn from(rejection: DiscountRejection) -> Self {
        AppError::Checkout(rejection.into())
    }
}

/// Body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorData {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, None),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, Some(json!({ "reason": reason })))
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, None),
            AppError::ServiceUnavailable(reason) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Some(json!({ "reason": reason })),
            ),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                serde_json::to_value(errors).ok(),
            ),
            AppError::Checkout(err) => (err.status(), Some(err.details())),
            AppError::DbError(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            AppError::OrmError(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let message = self.to_string();
        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData {
                error: message,
                details,
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
