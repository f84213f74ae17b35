use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

/// A message shown in the customer's notification inbox.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: Option<String>,
    pub link: Option<String>,
}

impl Notification {
    pub fn order_placed(order_id: Uuid, total: rust_decimal::Decimal) -> Self {
        Self {
            title: "Order placed".into(),
            body: Some(format!(
                "Your order #{} was placed. Total: {total}",
                short_id(order_id)
            )),
            link: Some(format!("/orders/{order_id}")),
        }
    }

    pub fn order_failed(reason: &str) -> Self {
        Self {
            title: "Order not placed".into(),
            body: Some(reason.to_string()),
            link: Some("/cart".into()),
        }
    }
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}

pub async fn notify(pool: &DbPool, user_id: Uuid, notification: &Notification) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO user_notifications (id, user_id, title, body, link)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.link)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fire-and-forget delivery; failures are logged and dropped.
pub async fn notify_best_effort(pool: &DbPool, user_id: Uuid, notification: Notification) {
    if let Err(err) = notify(pool, user_id, &notification).await {
        tracing::warn!(error = %err, %user_id, title = %notification.title, "notification failed");
    }
}
