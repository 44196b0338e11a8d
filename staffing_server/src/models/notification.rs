//! notifications: in-app messages written by the default notifier.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::notifications;

/// A message for one user, as handed to a `Notifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub related_shift_id: Option<i64>,
    pub related_timesheet_id: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = notifications)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub related_shift_id: Option<i64>,
    pub related_timesheet_id: Option<i64>,
    pub is_read: bool,
    pub create_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub related_shift_id: Option<i64>,
    pub related_timesheet_id: Option<i64>,
}

impl From<&Notification> for NewNotification {
    fn from(n: &Notification) -> Self {
        Self {
            user_id: n.user_id,
            title: n.title.clone(),
            message: n.message.clone(),
            related_shift_id: n.related_shift_id,
            related_timesheet_id: n.related_timesheet_id,
        }
    }
}
