use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
};
use chrono::Utc;

use crate::{
    dto::payments::{CaptureCallback, PaymentStatus, PaymentStatusQuery},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service::{self, SIGNATURE_TOLERANCE_SECS},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/paypal/capture", post(capture))
        .route("/paypal/status", get(status))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {name} header")))
}

#[utoipa::path(
    post,
    path = "/api/payments/paypal/capture",
    request_body = CaptureCallback,
    params(
        ("x-timestamp" = String, Header, description = "Unix seconds"),
        ("x-signature" = String, Header, description = "Hex HMAC-SHA256 of \"{timestamp}.{body}\"")
    ),
    responses(
        (status = 200, description = "Payment marked as captured", body = ApiResponse<PaymentStatus>),
        (status = 400, description = "Malformed callback"),
        (status = 401, description = "Missing or invalid signature"),
        (status = 402, description = "Capture not completed"),
        (status = 503, description = "No webhook secret configured"),
    ),
    tag = "Payments"
)]
pub async fn capture(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<PaymentStatus>>> {
    let Some(secret) = state.config.payment_webhook_secret.as_deref() else {
        return Err(AppError::ServiceUnavailable(
            "Payment callbacks are disabled".into(),
        ));
    };

    let timestamp = header_str(&headers, "x-timestamp")?;
    let signature = header_str(&headers, "x-signature")?;
    let valid = payment_service::verify_signature(
        secret,
        timestamp,
        signature,
        &body,
        Utc::now().timestamp(),
        SIGNATURE_TOLERANCE_SECS,
    );
    if !valid {
        tracing::warn!("rejected capture callback with bad signature");
        return Err(AppError::Unauthorized("Invalid signature".into()));
    }

    let payload: CaptureCallback = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid capture payload: {err}")))?;

    let resp = payment_service::capture(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/paypal/status",
    params(PaymentStatusQuery),
    responses(
        (status = 200, description = "Whether the external payment has been captured", body = ApiResponse<PaymentStatus>),
        (status = 400, description = "Missing payment id"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn status(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PaymentStatusQuery>,
) -> AppResult<Json<ApiResponse<PaymentStatus>>> {
    let resp = payment_service::payment_status(&state, &user, query).await?;
    Ok(Json(resp))
}
