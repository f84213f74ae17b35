use hmac::{Hmac, Mac};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, EntityTrait, Set};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    audit::{AuditAction, audit_best_effort},
    dto::payments::{CaptureCallback, PaymentStatus, PaymentStatusQuery},
    entity::payment_confirmations::{
        ActiveModel as ConfirmationActive, Column as ConfirmationCol, Entity as PaymentConfirmations,
    },
    error::{AppError, AppResult, CheckoutError},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    state::AppState,
};

type HmacSha256 = Hmac<Sha256>;

/// Provider capture status that counts as settled.
pub const CAPTURE_COMPLETED: &str = "COMPLETED";

/// Accepted clock skew for signed capture callbacks.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Whether the external payment has been captured for `customer_id`.
///
/// Unknown ids are unconfirmed, and so are captures recorded for another customer.
pub async fn is_confirmed<C: ConnectionTrait>(
    conn: &C,
    external_payment_id: &str,
    customer_id: Uuid,
) -> Result<bool, sea_orm::DbErr> {
    let found = PaymentConfirmations::find_by_id(external_payment_id.to_string())
        .one(conn)
        .await?;
    Ok(found.is_some_and(|confirmation| usable_by(confirmation.user_id, customer_id)))
}

fn usable_by(owner: Option<Uuid>, customer_id: Uuid) -> bool {
    owner.is_none_or(|owner| owner == customer_id)
}

/// Mark an external payment as captured. Repeated calls keep the first record.
///
/// Returns `true` when this call performed the transition.
pub async fn record_capture<C: ConnectionTrait>(
    conn: &C,
    external_payment_id: &str,
    user_id: Option<Uuid>,
) -> Result<bool, sea_orm::DbErr> {
    let confirmation = ConfirmationActive {
        external_payment_id: Set(external_payment_id.to_string()),
        user_id: Set(user_id),
        confirmed_at: Set(chrono::Utc::now().into()),
    };
    let inserted = PaymentConfirmations::insert(confirmation)
        .on_conflict(
            OnConflict::column(ConfirmationCol::ExternalPaymentId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(inserted > 0)
}

/// Check an `x-signature` header: hex HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    signature: &str,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> bool {
    let Ok(sent_at) = timestamp.parse::<i64>() else {
        return false;
    };
    if (now - sent_at).abs() > tolerance_secs {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Handle a provider capture callback whose signature was already checked.
pub async fn capture(
    state: &AppState,
    payload: CaptureCallback,
) -> AppResult<ApiResponse<PaymentStatus>> {
    let payment_id = payload.external_payment_id.trim();
    if payment_id.is_empty() {
        return Err(AppError::BadRequest("external_payment_id is required".into()));
    }
    if !payload.status.eq_ignore_ascii_case(CAPTURE_COMPLETED) {
        tracing::info!(external_payment_id = %payment_id, status = %payload.status, "capture not completed");
        return Err(CheckoutError::PaymentNotConfirmed.into());
    }

    let user_id = payload.customer_id;
    let recorded = record_capture(&state.orm, payment_id, user_id).await?;
    if recorded {
        tracing::info!(external_payment_id = %payment_id, "payment captured");
        audit_best_effort(
            &state.pool,
            user_id,
            AuditAction::PaymentCaptured,
            "payment_confirmations",
            serde_json::json!({ "external_payment_id": payment_id }),
        )
        .await;
    }

    Ok(ApiResponse::success(
        if recorded { "Payment captured" } else { "Payment already captured" },
        PaymentStatus { paid: true },
        Some(Meta::empty()),
    ))
}

pub async fn payment_status(
    state: &AppState,
    user: &AuthUser,
    query: PaymentStatusQuery,
) -> AppResult<ApiResponse<PaymentStatus>> {
    let Some(payment_id) = query
        .external_payment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    else {
        return Err(AppError::BadRequest("external_payment_id is required".into()));
    };

    let paid = is_confirmed(&state.orm, payment_id, user.user_id).await?;
    Ok(ApiResponse::success("OK", PaymentStatus { paid }, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"external_payment_id":"PP-1","status":"COMPLETED"}"#;
        let signature = sign("s3cret", "1700000000", body);
        assert!(verify_signature("s3cret", "1700000000", &signature, body, 1_700_000_100, 300));
    }

    #[test]
    fn rejects_tampered_body_or_wrong_secret() {
        let body = br#"{"external_payment_id":"PP-1","status":"COMPLETED"}"#;
        let signature = sign("s3cret", "1700000000", body);
        assert!(!verify_signature("s3cret", "1700000000", &signature, b"{}", 1_700_000_000, 300));
        assert!(!verify_signature("other", "1700000000", &signature, body, 1_700_000_000, 300));
        assert!(!verify_signature("s3cret", "1700000000", "zz", body, 1_700_000_000, 300));
    }

    #[test]
    fn capture_is_usable_only_by_its_owner() {
        let owner = Uuid::new_v4();
        assert!(usable_by(Some(owner), owner));
        assert!(!usable_by(Some(owner), Uuid::new_v4()));
        assert!(usable_by(None, owner));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let body = b"{}";
        let signature = sign("s3cret", "1700000000", body);
        assert!(!verify_signature("s3cret", "1700000000", &signature, body, 1_700_000_301, 300));
        assert!(!verify_signature("s3cret", "not-a-number", &signature, body, 1_700_000_000, 300));
    }
}
