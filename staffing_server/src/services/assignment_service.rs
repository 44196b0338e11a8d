//! Assignment manager: the lifecycle of a worker slot on a shift.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::events::assignment::AssignmentEvent;
use crate::models::assignment::{
    AssignedPersonnel, AssignmentStatus, NewAssignedPersonnel, SlotRef,
};
use crate::models::notification::Notification;
use crate::models::requirement::{is_valid_role_code, role_label};
use crate::models::shift::ShiftContext;
use crate::models::user::CurrentUser;
use crate::schema::{assigned_personnel, time_entries, users};
use crate::services::notification_service::{self, BroadcastEvent, Broadcaster, Notifier};
use crate::services::{permission_service, shift_service};

/// Dropping earlier than this before start deletes the slot; later releases it.
pub const DROP_RELEASE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropOutcome {
    /// Slot removed; the shift is far enough out to be re-staffed normally.
    Delete,
    /// Slot kept with no worker and offered to everyone.
    Release,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropResult {
    pub assignment_id: i64,
    pub shift_id: i64,
    pub outcome: DropOutcome,
    pub notified: usize,
}

pub fn drop_outcome(shift_start: DateTime<Utc>, now: DateTime<Utc>) -> DropOutcome {
    if shift_start - now > Duration::hours(DROP_RELEASE_WINDOW_HOURS) {
        DropOutcome::Delete
    } else {
        DropOutcome::Release
    }
}

/// Lock an assignment row for the rest of the transaction.
pub(crate) async fn lock_assignment(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
) -> EngineResult<AssignedPersonnel> {
    assigned_personnel::table
        .find(assignment_id)
        .select(AssignedPersonnel::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Assignment {assignment_id} not found")))
}

/// Get an assignment by ID.
pub async fn get_assignment(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
) -> EngineResult<AssignedPersonnel> {
    assigned_personnel::table
        .find(assignment_id)
        .select(AssignedPersonnel::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Assignment {assignment_id} not found")))
}

pub(crate) async fn has_time_entries(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
) -> EngineResult<bool> {
    let exists = diesel::select(diesel::dsl::exists(
        time_entries::table.filter(time_entries::assigned_personnel_id.eq(assignment_id)),
    ))
    .get_result::<bool>(conn)
    .await?;
    Ok(exists)
}

pub(crate) async fn has_active_entry(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
) -> EngineResult<bool> {
    let exists = diesel::select(diesel::dsl::exists(
        time_entries::table
            .filter(time_entries::assigned_personnel_id.eq(assignment_id))
            .filter(time_entries::is_active.eq(true)),
    ))
    .get_result::<bool>(conn)
    .await?;
    Ok(exists)
}

async fn user_on_shift(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
    user_id: i64,
) -> EngineResult<bool> {
    let exists = diesel::select(diesel::dsl::exists(
        assigned_personnel::table
            .filter(assigned_personnel::shift_id.eq(shift_id))
            .filter(assigned_personnel::user_id.eq(user_id)),
    ))
    .get_result::<bool>(conn)
    .await?;
    Ok(exists)
}

async fn require_active_user(conn: &mut AsyncPgConnection, user_id: i64) -> EngineResult<()> {
    let active: Option<bool> = users::table
        .find(user_id)
        .select(users::active)
        .first(conn)
        .await
        .optional()?;
    match active {
        Some(true) => Ok(()),
        Some(false) => Err(EngineError::Validation(format!(
            "User {user_id} is inactive"
        ))),
        None => Err(EngineError::NotFound(format!("User {user_id} not found"))),
    }
}

fn already_assigned(user_id: i64, shift_id: i64) -> EngineError {
    EngineError::Conflict(format!(
        "User {user_id} is already assigned to shift {shift_id}"
    ))
}

async fn insert_assignment(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
    user_id: i64,
    role_code: &str,
) -> EngineResult<AssignedPersonnel> {
    if user_on_shift(conn, shift_id, user_id).await? {
        return Err(already_assigned(user_id, shift_id));
    }

    diesel::insert_into(assigned_personnel::table)
        .values(NewAssignedPersonnel {
            shift_id,
            user_id: Some(user_id),
            role_code: role_code.to_string(),
            status: AssignmentStatus::Assigned.as_str().to_string(),
        })
        .returning(AssignedPersonnel::as_returning())
        .get_result(conn)
        .await
        // Lost a race with a concurrent assign of the same user.
        .map_err(|e| match EngineError::from(e) {
            EngineError::Conflict(_) => already_assigned(user_id, shift_id),
            other => other,
        })
}

fn check_role_code(role_code: &str) -> EngineResult<()> {
    if is_valid_role_code(role_code) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "Invalid role code '{role_code}'"
        )))
    }
}

/// Slots on a shift, ordered by ID.
pub async fn list_for_shift(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Vec<AssignedPersonnel>> {
    shift_service::load_shift(conn, shift_id).await?;

    let rows = assigned_personnel::table
        .filter(assigned_personnel::shift_id.eq(shift_id))
        .order(assigned_personnel::id.asc())
        .select(AssignedPersonnel::as_select())
        .load(conn)
        .await?;
    Ok(rows)
}

/// Put a worker on a shift. Requirement counts never block this.
pub async fn assign(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    user_id: i64,
    role_code: &str,
) -> EngineResult<AssignedPersonnel> {
    check_role_code(role_code)?;

    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                shift_service::lock_open_shift(conn, shift_id).await?;
                require_active_user(conn, user_id).await?;
                insert_assignment(conn, shift_id, user_id, role_code).await
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::assignment_action("assign");
    tracing::info!(
        assignment_id = row.id,
        shift_id,
        user_id,
        role_code,
        assigned_by = actor.id,
        "Worker assigned"
    );
    Ok(row)
}

/// Swap the worker in a slot. The old row must have no time history.
pub async fn replace(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    slot: SlotRef,
    shift_id: i64,
    new_user_id: i64,
    role_code: &str,
) -> EngineResult<AssignedPersonnel> {
    check_role_code(role_code)?;

    let (replaced, row) = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                shift_service::lock_open_shift(conn, shift_id).await?;

                let mut replaced = None;
                if let SlotRef::Persisted { id } = slot {
                    let old = lock_assignment(conn, id).await?;
                    if old.shift_id != shift_id {
                        return Err(EngineError::NotFound(format!(
                            "Assignment {id} is not on shift {shift_id}"
                        )));
                    }
                    if has_time_entries(conn, id).await? {
                        return Err(EngineError::InvalidState(
                            "Cannot replace assignment with existing time entries".to_string(),
                        ));
                    }
                    diesel::delete(assigned_personnel::table.find(id))
                        .execute(conn)
                        .await?;
                    replaced = Some(old);
                }

                require_active_user(conn, new_user_id).await?;
                let row = insert_assignment(conn, shift_id, new_user_id, role_code).await?;
                Ok((replaced, row))
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::assignment_action("replace");
    tracing::info!(
        assignment_id = row.id,
        replaced_id = replaced.as_ref().map(|r| r.id),
        replaced_user_id = replaced.as_ref().and_then(|r| r.user_id),
        shift_id,
        user_id = new_user_id,
        "Assignment replaced"
    );
    Ok(row)
}

/// Remove a slot. Returns the removed row; placeholders return `None`.
pub async fn unassign(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    slot: SlotRef,
) -> EngineResult<Option<AssignedPersonnel>> {
    let SlotRef::Persisted { id } = slot else {
        tracing::debug!("Unassign of a placeholder slot, nothing to delete");
        return Ok(None);
    };

    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let row = lock_assignment(conn, id).await?;
                permission_service::require_manage_shift(conn, actor, row.shift_id).await?;

                if has_active_entry(conn, id).await? {
                    return Err(EngineError::InvalidState(
                        "Worker is clocked in; clock the worker out first".to_string(),
                    ));
                }

                // Closed time entries stay behind as history.
                diesel::delete(assigned_personnel::table.find(id))
                    .execute(conn)
                    .await?;
                Ok(row)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::assignment_action("unassign");
    tracing::info!(
        assignment_id = row.id,
        shift_id = row.shift_id,
        user_id = row.user_id,
        unassigned_by = actor.id,
        "Worker unassigned"
    );
    Ok(Some(row))
}

/// Take an up-for-grabs slot.
pub async fn claim(
    conn: &mut AsyncPgConnection,
    claimer: &CurrentUser,
    shift_id: i64,
    assignment_id: i64,
) -> EngineResult<AssignedPersonnel> {
    if !claimer.role.is_worker() {
        return Err(EngineError::Forbidden(
            "Only employees and crew chiefs can claim shifts".to_string(),
        ));
    }
    let claimer_id = claimer.id;

    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                shift_service::lock_open_shift(conn, shift_id).await?;
                let slot = lock_assignment(conn, assignment_id).await?;
                if slot.shift_id != shift_id {
                    return Err(EngineError::NotFound(format!(
                        "Assignment {assignment_id} not found on shift {shift_id}"
                    )));
                }

                if slot.user_id.is_some() {
                    return Err(EngineError::Gone(
                        "This slot has already been claimed".to_string(),
                    ));
                }
                require_active_user(conn, claimer_id).await?;
                if user_on_shift(conn, shift_id, claimer_id).await? {
                    return Err(already_assigned(claimer_id, shift_id));
                }

                let next = match slot.status()? {
                    AssignmentStatus::UpForGrabs => {
                        AssignmentStatus::UpForGrabs.apply(AssignmentEvent::Claimed)?
                    }
                    _ => {
                        return Err(EngineError::Gone(
                            "This slot is no longer up for grabs".to_string(),
                        ))
                    }
                };

                diesel::update(
                    assigned_personnel::table
                        .find(assignment_id)
                        .filter(assigned_personnel::user_id.is_null()),
                )
                .set((
                    assigned_personnel::user_id.eq(Some(claimer_id)),
                    assigned_personnel::status.eq(next.as_str()),
                    assigned_personnel::write_date.eq(Utc::now()),
                ))
                .returning(AssignedPersonnel::as_returning())
                .get_result(conn)
                .await
                .optional()?
                .ok_or_else(|| EngineError::Gone("This slot has already been claimed".to_string()))
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::assignment_action("claim");
    tracing::info!(
        assignment_id,
        shift_id,
        user_id = claimer_id,
        role_code = %row.role_code,
        "Open slot claimed"
    );
    Ok(row)
}

fn up_for_grabs_message(ctx: &ShiftContext, role_code: &str) -> String {
    format!(
        "A {} slot for {} at {} starting {} is up for grabs.",
        role_label(role_code),
        ctx.company_name,
        ctx.shift.location.as_deref().unwrap_or("an unspecified location"),
        ctx.shift.start_time.format("%a %b %-d %H:%M UTC"),
    )
}

/// A worker gives up their own slot.
///
/// Far from start the row is deleted. Inside the release window the slot
/// stays open, every other active worker is notified, and an
/// up-for-grabs event is broadcast. Delivery runs after commit.
pub async fn drop_assignment(
    conn: &mut AsyncPgConnection,
    notifier: &dyn Notifier,
    broadcaster: Option<&dyn Broadcaster>,
    assignment_id: i64,
    dropper: &CurrentUser,
    now: DateTime<Utc>,
) -> EngineResult<DropResult> {
    let dropper_id = dropper.id;

    let (row, ctx, outcome) = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let row = lock_assignment(conn, assignment_id).await?;
                if row.user_id != Some(dropper_id) {
                    return Err(EngineError::Forbidden(
                        "Only the assigned worker can drop this shift".to_string(),
                    ));
                }
                let released = row.status()?.apply(AssignmentEvent::Released)?;

                let ctx = shift_service::load_shift_context(conn, row.shift_id).await?;
                let outcome = drop_outcome(ctx.shift.start_time, now);

                match outcome {
                    DropOutcome::Delete => {
                        diesel::delete(assigned_personnel::table.find(assignment_id))
                            .execute(conn)
                            .await?;
                    }
                    DropOutcome::Release => {
                        diesel::update(assigned_personnel::table.find(assignment_id))
                            .set((
                                assigned_personnel::user_id.eq(None::<i64>),
                                assigned_personnel::status.eq(released.as_str()),
                                assigned_personnel::write_date.eq(now),
                            ))
                            .execute(conn)
                            .await?;
                    }
                }
                Ok((row, ctx, outcome))
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::assignment_action("drop");
    tracing::info!(
        assignment_id,
        shift_id = row.shift_id,
        user_id = dropper_id,
        outcome = ?outcome,
        "Shift dropped"
    );

    let mut notified = 0;
    if outcome == DropOutcome::Release {
        let message = up_for_grabs_message(&ctx, &row.role_code);
        match notification_service::active_worker_ids(conn).await {
            Ok(recipients) => {
                let batch = recipients
                    .into_iter()
                    .filter(|id| *id != dropper_id)
                    .map(|user_id| Notification {
                        user_id,
                        title: "Shift Up for Grabs".to_string(),
                        message: message.clone(),
                        related_shift_id: Some(row.shift_id),
                        related_timesheet_id: None,
                    })
                    .collect();
                notified = notification_service::fan_out(notifier, batch).await;
            }
            Err(e) => {
                crate::metrics::delivery_failed("notification");
                tracing::warn!(assignment_id, "Could not load up-for-grabs recipients: {e}");
            }
        }

        notification_service::broadcast_best_effort(
            broadcaster,
            BroadcastEvent::ShiftUpForGrabs {
                shift_id: row.shift_id,
                assignment_id,
                role_code: row.role_code.clone(),
                start_time: ctx.shift.start_time,
            },
        )
        .await;
    }

    Ok(DropResult {
        assignment_id,
        shift_id: row.shift_id,
        outcome,
        notified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::models::shift::Shift;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 10, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_drop_far_ahead_deletes() {
        let now = start() - Duration::hours(25);
        assert_eq!(drop_outcome(start(), now), DropOutcome::Delete);
    }

    #[test]
    fn test_drop_exactly_at_window_releases() {
        let now = start() - Duration::hours(DROP_RELEASE_WINDOW_HOURS);
        assert_eq!(drop_outcome(start(), now), DropOutcome::Release);
    }

    #[test]
    fn test_drop_one_second_outside_window_deletes() {
        let now = start() - Duration::hours(24) - Duration::seconds(1);
        assert_eq!(drop_outcome(start(), now), DropOutcome::Delete);
    }

    #[test]
    fn test_drop_after_start_releases() {
        let now = start() + Duration::minutes(30);
        assert_eq!(drop_outcome(start(), now), DropOutcome::Release);
    }

    #[test]
    fn test_up_for_grabs_message_names_role_company_location() {
        let ctx = ShiftContext {
            shift: Shift {
                id: 1,
                job_id: 2,
                date: NaiveDate::from_ymd_opt(2026, 7, 10).unwrap(),
                start_time: start(),
                end_time: start() + Duration::hours(8),
                location: Some("Pier 48".to_string()),
                status: "pending".to_string(),
                requested_workers: None,
                create_date: None,
                write_date: None,
            },
            job_name: "Summer Expo".to_string(),
            company_id: 3,
            company_name: "Harbor Events".to_string(),
        };
        let msg = up_for_grabs_message(&ctx, "FO");
        assert!(msg.contains("Fork Operator"));
        assert!(msg.contains("Harbor Events"));
        assert!(msg.contains("Pier 48"));
        assert!(msg.contains("Fri Jul 10 08:00 UTC"));
    }
}
