//! Notification and real-time broadcast collaborators.
//!
//! Both are best-effort: failures are logged and counted, never returned to
//! the operation that triggered them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

use crate::db::DieselPool;
use crate::error::EngineResult;
use crate::models::notification::{NewNotification, Notification};
use crate::models::user::UserRole;
use crate::schema::{assigned_personnel, notifications, users};

/// Push a notification to one user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the `notifications` table.
pub struct DbNotifier {
    pool: Arc<DieselPool>,
}

impl DbNotifier {
    pub fn new(pool: Arc<DieselPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;

        diesel::insert_into(notifications::table)
            .values(NewNotification::from(notification))
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

/// Deliver every notification, logging failures. Returns the delivered count.
pub async fn fan_out(notifier: &dyn Notifier, batch: Vec<Notification>) -> usize {
    let total = batch.len();
    let mut delivered = 0;
    for notification in &batch {
        match notifier.notify(notification).await {
            Ok(()) => delivered += 1,
            Err(e) => {
                crate::metrics::delivery_failed("notification");
                tracing::warn!(
                    user_id = notification.user_id,
                    title = %notification.title,
                    "Notification delivery failed: {e}"
                );
            }
        }
    }
    tracing::debug!(delivered, total, "Notification fan-out finished");
    delivered
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    ShiftUpForGrabs {
        shift_id: i64,
        assignment_id: i64,
        role_code: String,
        start_time: DateTime<Utc>,
    },
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, event: &BroadcastEvent) -> anyhow::Result<()>;
}

/// POSTs events as JSON to the realtime gateway.
pub struct HttpBroadcaster {
    client: reqwest::Client,
    url: String,
}

impl HttpBroadcaster {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Broadcaster for HttpBroadcaster {
    async fn broadcast(&self, event: &BroadcastEvent) -> anyhow::Result<()> {
        let resp = self.client.post(&self.url).json(event).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("broadcast gateway returned {}", resp.status());
        }
        Ok(())
    }
}

/// Broadcast if a broadcaster is configured; never fails.
pub async fn broadcast_best_effort(broadcaster: Option<&dyn Broadcaster>, event: BroadcastEvent) {
    let Some(broadcaster) = broadcaster else {
        tracing::debug!("No broadcaster configured, skipping realtime event");
        return;
    };
    if let Err(e) = broadcaster.broadcast(&event).await {
        crate::metrics::delivery_failed("broadcast");
        tracing::warn!("Realtime broadcast failed: {e}");
    }
}

async fn active_users_matching(
    conn: &mut AsyncPgConnection,
    keep: impl Fn(UserRole) -> bool,
) -> EngineResult<Vec<i64>> {
    let rows: Vec<(i64, String)> = users::table
        .filter(users::active.eq(true))
        .select((users::id, users::role))
        .order(users::id.asc())
        .load(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter(|(_, role)| UserRole::parse(role).is_some_and(&keep))
        .map(|(id, _)| id)
        .collect())
}

/// Active employees and crew chiefs: the audience for up-for-grabs offers.
pub async fn active_worker_ids(conn: &mut AsyncPgConnection) -> EngineResult<Vec<i64>> {
    active_users_matching(conn, |role| role.is_worker()).await
}

/// Active admins and staff.
pub async fn active_manager_ids(conn: &mut AsyncPgConnection) -> EngineResult<Vec<i64>> {
    active_users_matching(conn, |role| role.is_manager()).await
}

/// Users currently holding a slot on the shift.
pub async fn claimed_user_ids(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Vec<i64>> {
    let ids: Vec<Option<i64>> = assigned_personnel::table
        .filter(assigned_personnel::shift_id.eq(shift_id))
        .filter(assigned_personnel::user_id.is_not_null())
        .select(assigned_personnel::user_id)
        .load(conn)
        .await?;
    Ok(ids.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyNotifier {
        fail_for: i64,
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(notification.user_id);
            if notification.user_id == self.fail_for {
                anyhow::bail!("mailbox full");
            }
            Ok(())
        }
    }

    fn note(user_id: i64) -> Notification {
        Notification {
            user_id,
            title: "Shift Up for Grabs".to_string(),
            message: "GL slot open".to_string(),
            related_shift_id: Some(1),
            related_timesheet_id: None,
        }
    }

    #[tokio::test]
    async fn test_fan_out_continues_past_failures() {
        let notifier = FlakyNotifier {
            fail_for: 2,
            seen: Mutex::new(Vec::new()),
        };
        let delivered = fan_out(&notifier, vec![note(1), note(2), note(3)]).await;
        assert_eq!(delivered, 2);
        assert_eq!(*notifier.seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_broadcast_without_broadcaster_is_noop() {
        broadcast_best_effort(
            None,
            BroadcastEvent::ShiftUpForGrabs {
                shift_id: 1,
                assignment_id: 2,
                role_code: "GL".to_string(),
                start_time: Utc::now(),
            },
        )
        .await;
    }

    #[test]
    fn test_broadcast_event_json_shape() {
        let event = BroadcastEvent::ShiftUpForGrabs {
            shift_id: 1,
            assignment_id: 2,
            role_code: "FO".to_string(),
            start_time: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "shift_up_for_grabs");
        assert_eq!(json["role_code"], "FO");
    }
}
