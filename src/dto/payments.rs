use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CaptureCallback {
    pub external_payment_id: String,
    /// Provider capture status; only `COMPLETED` confirms the payment.
    pub status: String,
    /// Customer the payment was created for. When present, only that customer
    /// can place an order against it.
    #[serde(default)]
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct PaymentStatusQuery {
    pub external_payment_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatus {
    pub paid: bool,
}
