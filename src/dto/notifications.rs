use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{models::UserNotification, routes::params::Pagination};

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    /// Only return notifications that have not been read yet.
    pub unread_only: Option<bool>,
}

impl NotificationQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationList {
    pub items: Vec<UserNotification>,
    /// Unread notifications across the whole inbox, not just this page.
    pub unread: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}
