use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::{
    dto::notifications::{MarkedRead, NotificationList, NotificationQuery},
    entity::user_notifications::{Column as NoticeCol, Entity as UserNotifications, Model as NoticeModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::UserNotification,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_notifications(
    state: &AppState,
    user: &AuthUser,
    query: NotificationQuery,
) -> AppResult<ApiResponse<NotificationList>> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all().add(NoticeCol::UserId.eq(user.user_id));
    if query.unread_only.unwrap_or(false) {
        condition = condition.add(NoticeCol::IsRead.eq(false));
    }

    let finder = UserNotifications::find()
        .filter(condition)
        .order_by_desc(NoticeCol::CreatedAt)
        .order_by_asc(NoticeCol::Id);
    let total = finder.clone().count(&state.orm).await? as i64;
    let unread = unread_count(state, user.user_id).await?;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(notification_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        NotificationList { items, unread },
        Some(Meta::new(page, limit, total)),
    ))
}

async fn unread_count(state: &AppState, user_id: Uuid) -> Result<u64, sea_orm::DbErr> {
    UserNotifications::find()
        .filter(NoticeCol::UserId.eq(user_id))
        .filter(NoticeCol::IsRead.eq(false))
        .count(&state.orm)
        .await
}

/// Mark one of the caller's notifications as read. Repeating it is harmless.
pub async fn mark_read(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<MarkedRead>> {
    let result = UserNotifications::update_many()
        .col_expr(NoticeCol::IsRead, Expr::value(true))
        .filter(NoticeCol::Id.eq(id))
        .filter(NoticeCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    Ok(ApiResponse::success(
        "Marked as read",
        MarkedRead {
            updated: result.rows_affected,
        },
        Some(Meta::empty()),
    ))
}

pub async fn mark_all_read(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<MarkedRead>> {
    let result = UserNotifications::update_many()
        .col_expr(NoticeCol::IsRead, Expr::value(true))
        .filter(NoticeCol::UserId.eq(user.user_id))
        .filter(NoticeCol::IsRead.eq(false))
        .exec(&state.orm)
        .await?;

    tracing::debug!(user_id = %user.user_id, updated = result.rows_affected, "notifications marked read");
    Ok(ApiResponse::success(
        "Marked as read",
        MarkedRead {
            updated: result.rows_affected,
        },
        Some(Meta::empty()),
    ))
}

fn notification_from_entity(model: NoticeModel) -> UserNotification {
    UserNotification {
        id: model.id,
        title: model.title,
        body: model.body,
        link: model.link,
        is_read: model.is_read,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
