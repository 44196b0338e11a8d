//! Time tracking: clock-in/out entries for an assignment.
//!
//! An assignment has at most one active entry. Entries are closed, never
//! deleted; reporting rounds them without touching the stored timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::error::{EngineError, EngineResult};
use crate::events::assignment::AssignmentEvent;
use crate::models::assignment::{AssignedPersonnel, AssignmentStatus};
use crate::models::time_entry::{
    minutes_to_hours, worked_minutes, AssignmentHours, NewTimeEntry, TimeEntry, MIN_ENTRY_SECONDS,
};
use crate::models::user::CurrentUser;
use crate::schema::{assigned_personnel, time_entries};
use crate::services::assignment_service::{get_assignment, has_time_entries, lock_assignment};
use crate::services::{permission_service, shift_service};

/// Reject clock-outs that are not after the clock-in or are under a minute.
pub fn validate_clock_out(clock_in: DateTime<Utc>, now: DateTime<Utc>) -> EngineResult<()> {
    if now <= clock_in {
        return Err(EngineError::Validation(
            "Clock-out time must be after clock-in time".to_string(),
        ));
    }
    if (now - clock_in).num_seconds() < MIN_ENTRY_SECONDS {
        return Err(EngineError::Validation(
            "Time entry must be at least 1 minute long".to_string(),
        ));
    }
    Ok(())
}

async fn active_entry(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
) -> EngineResult<Option<TimeEntry>> {
    let entry = time_entries::table
        .filter(time_entries::assigned_personnel_id.eq(assignment_id))
        .filter(time_entries::is_active.eq(true))
        .select(TimeEntry::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?;
    Ok(entry)
}

async fn close_entry(
    conn: &mut AsyncPgConnection,
    entry: &TimeEntry,
    clock_out: DateTime<Utc>,
) -> EngineResult<TimeEntry> {
    let closed = diesel::update(time_entries::table.find(entry.id))
        .set((
            time_entries::clock_out.eq(Some(clock_out)),
            time_entries::is_active.eq(false),
            time_entries::write_date.eq(Utc::now()),
        ))
        .returning(TimeEntry::as_returning())
        .get_result(conn)
        .await?;
    crate::metrics::worked_minutes(closed.rounded_duration().num_minutes());
    Ok(closed)
}

/// Close the active entry, if any, at `now` but never before its clock-in.
async fn force_close_active(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Option<TimeEntry>> {
    match active_entry(conn, assignment_id).await? {
        Some(entry) => {
            let clock_out = now.max(entry.clock_in);
            Ok(Some(close_entry(conn, &entry, clock_out).await?))
        }
        None => Ok(None),
    }
}

async fn set_status(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
    status: AssignmentStatus,
) -> EngineResult<AssignedPersonnel> {
    let row = diesel::update(assigned_personnel::table.find(assignment_id))
        .set((
            assigned_personnel::status.eq(status.as_str()),
            assigned_personnel::write_date.eq(Utc::now()),
        ))
        .returning(AssignedPersonnel::as_returning())
        .get_result(conn)
        .await?;
    Ok(row)
}

fn require_worker(row: &AssignedPersonnel) -> EngineResult<i64> {
    row.user_id.ok_or_else(|| {
        EngineError::InvalidState(format!(
            "Assignment {} is an open slot with no worker",
            row.id
        ))
    })
}

/// Start a new time entry.
pub async fn clock_in(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    assignment_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<TimeEntry> {
    let entry = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                // Shift before slot, the same lock order as assign and finalize.
                let shift_id = get_assignment(conn, assignment_id).await?.shift_id;
                shift_service::lock_open_shift(conn, shift_id).await?;
                let row = lock_assignment(conn, assignment_id).await?;
                permission_service::require_worker_or_manager(conn, actor, &row).await?;
                let user_id = require_worker(&row)?;

                if active_entry(conn, assignment_id).await?.is_some() {
                    return Err(EngineError::Conflict(
                        "Worker is already clocked in".to_string(),
                    ));
                }
                let next = row.status()?.apply(AssignmentEvent::ClockedIn)?;

                let last: Option<i32> = time_entries::table
                    .filter(time_entries::assigned_personnel_id.eq(assignment_id))
                    .select(max(time_entries::entry_number))
                    .first(conn)
                    .await?;

                let entry = diesel::insert_into(time_entries::table)
                    .values(NewTimeEntry {
                        assigned_personnel_id: assignment_id,
                        shift_id: row.shift_id,
                        user_id,
                        entry_number: last.unwrap_or(0) + 1,
                        clock_in: now,
                        is_active: true,
                    })
                    .returning(TimeEntry::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(|e| match EngineError::from(e) {
                        EngineError::Conflict(_) => {
                            EngineError::Conflict("Worker is already clocked in".to_string())
                        }
                        other => other,
                    })?;

                set_status(conn, assignment_id, next).await?;
                Ok(entry)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::clock_event("clock_in");
    tracing::info!(
        assignment_id,
        entry_id = entry.id,
        entry_number = entry.entry_number,
        user_id = entry.user_id,
        "Clocked in"
    );
    Ok(entry)
}

/// Close the active entry.
pub async fn clock_out(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    assignment_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<TimeEntry> {
    let entry = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let row = lock_assignment(conn, assignment_id).await?;
                permission_service::require_worker_or_manager(conn, actor, &row).await?;
                require_worker(&row)?;

                let active = active_entry(conn, assignment_id).await?.ok_or_else(|| {
                    EngineError::InvalidState("Worker is not clocked in".to_string())
                })?;
                validate_clock_out(active.clock_in, now)?;
                let next = row.status()?.apply(AssignmentEvent::ClockedOut)?;

                let closed = close_entry(conn, &active, now).await?;
                set_status(conn, assignment_id, next).await?;
                Ok(closed)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::clock_event("clock_out");
    tracing::info!(
        assignment_id,
        entry_id = entry.id,
        entry_number = entry.entry_number,
        "Clocked out"
    );
    Ok(entry)
}

/// Close any open entry and mark the assignment ended. Already-ended rows
/// are returned unchanged.
async fn end_locked(
    conn: &mut AsyncPgConnection,
    row: &AssignedPersonnel,
    now: DateTime<Utc>,
) -> EngineResult<AssignedPersonnel> {
    require_worker(row)?;
    let current = row.status()?;
    let next = current.apply(AssignmentEvent::ShiftEnded)?;
    if current == AssignmentStatus::ShiftEnded {
        return Ok(row.clone());
    }
    force_close_active(conn, row.id, now).await?;
    set_status(conn, row.id, next).await
}

/// End the shift for one worker.
pub async fn end_shift(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    assignment_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<AssignedPersonnel> {
    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let row = lock_assignment(conn, assignment_id).await?;
                permission_service::require_manage_shift(conn, actor, row.shift_id).await?;
                end_locked(conn, &row, now).await
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::clock_event("end_shift");
    tracing::info!(
        assignment_id,
        shift_id = row.shift_id,
        user_id = row.user_id,
        "Shift ended for worker"
    );
    Ok(row)
}

async fn lock_shift_assignments(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Vec<AssignedPersonnel>> {
    let rows = assigned_personnel::table
        .filter(assigned_personnel::shift_id.eq(shift_id))
        .filter(assigned_personnel::user_id.is_not_null())
        .order(assigned_personnel::id.asc())
        .select(AssignedPersonnel::as_select())
        .for_update()
        .load(conn)
        .await?;
    Ok(rows)
}

/// Send the whole crew on break: close every open entry on the shift.
pub async fn master_start_break(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Vec<AssignedPersonnel>> {
    let affected = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                let rows = lock_shift_assignments(conn, shift_id).await?;

                let mut affected = Vec::new();
                for row in rows {
                    let status = row.status()?;
                    if status.is_terminal() {
                        continue;
                    }
                    if force_close_active(conn, row.id, now).await?.is_none() {
                        continue;
                    }
                    let next = status.apply(AssignmentEvent::BreakStarted)?;
                    affected.push(set_status(conn, row.id, next).await?);
                }
                Ok(affected)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::clock_event("break_start");
    tracing::info!(
        shift_id,
        affected = affected.len(),
        started_by = actor.id,
        "Crew break started"
    );
    Ok(affected)
}

/// End the shift for every claimed, non-terminal worker.
pub async fn master_end_shift(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Vec<AssignedPersonnel>> {
    let affected = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                let rows = lock_shift_assignments(conn, shift_id).await?;

                let mut affected = Vec::new();
                for row in rows {
                    if row.status()?.is_terminal() {
                        continue;
                    }
                    affected.push(end_locked(conn, &row, now).await?);
                }
                Ok(affected)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::clock_event("end_shift");
    tracing::info!(
        shift_id,
        affected = affected.len(),
        ended_by = actor.id,
        "Shift ended for all workers"
    );
    Ok(affected)
}

/// Mark a worker who never clocked in as a no-show.
pub async fn mark_no_show(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    assignment_id: i64,
) -> EngineResult<AssignedPersonnel> {
    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let row = lock_assignment(conn, assignment_id).await?;
                permission_service::require_manage_shift(conn, actor, row.shift_id).await?;
                require_worker(&row)?;

                if has_time_entries(conn, assignment_id).await? {
                    return Err(EngineError::InvalidState(
                        "Worker has time entries and cannot be marked as a no-show".to_string(),
                    ));
                }
                let next = row.status()?.apply(AssignmentEvent::MarkedNoShow)?;
                set_status(conn, assignment_id, next).await
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!(
        assignment_id,
        shift_id = row.shift_id,
        user_id = row.user_id,
        "Worker marked as no-show"
    );
    Ok(row)
}

/// Entries of an assignment in entry order, including orphaned history.
pub async fn list_entries(
    conn: &mut AsyncPgConnection,
    assignment_id: i64,
) -> EngineResult<Vec<TimeEntry>> {
    let entries = time_entries::table
        .filter(time_entries::assigned_personnel_id.eq(assignment_id))
        .order(time_entries::entry_number.asc())
        .select(TimeEntry::as_select())
        .load(conn)
        .await?;
    Ok(entries)
}

/// Rounded worked time per slot on a shift.
pub async fn shift_hours(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Vec<AssignmentHours>> {
    shift_service::load_shift(conn, shift_id).await?;

    let rows: Vec<AssignedPersonnel> = assigned_personnel::table
        .filter(assigned_personnel::shift_id.eq(shift_id))
        .order(assigned_personnel::id.asc())
        .select(AssignedPersonnel::as_select())
        .load(conn)
        .await?;

    let entries: Vec<TimeEntry> = time_entries::table
        .filter(time_entries::shift_id.eq(shift_id))
        .order((
            time_entries::assigned_personnel_id.asc(),
            time_entries::entry_number.asc(),
        ))
        .select(TimeEntry::as_select())
        .load(conn)
        .await?;

    let mut by_assignment: HashMap<i64, Vec<TimeEntry>> = HashMap::new();
    for entry in entries {
        by_assignment
            .entry(entry.assigned_personnel_id)
            .or_default()
            .push(entry);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let entries = by_assignment.remove(&row.id).unwrap_or_default();
            let minutes = worked_minutes(&entries);
            AssignmentHours {
                assigned_personnel_id: row.id,
                user_id: row.user_id,
                role_code: row.role_code,
                entries: entries.len(),
                worked_minutes: minutes,
                worked_hours: minutes_to_hours(minutes),
            }
        })
        .collect())
}
