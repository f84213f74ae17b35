use sea_orm::ActiveEnum;
use serde_json::Value;
use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

pub use crate::entity::audit_logs::AuditAction;

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action.to_value())
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Audit without failing the caller; the write is logged when it does not land.
pub async fn audit_best_effort(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    resource: &str,
    metadata: Value,
) {
    if let Err(err) = log_audit(pool, user_id, action, Some(resource), Some(metadata)).await {
        tracing::warn!(error = %err, action = %action.to_value(), "audit log failed");
    }
}
