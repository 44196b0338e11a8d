//! Worker requirement ledger: per-role head counts and the fill ratio.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::error::{EngineError, EngineResult};
use crate::models::requirement::{
    is_valid_role_code, FillState, NewWorkerRequirement, WorkerRequirement,
};
use crate::models::user::CurrentUser;
use crate::schema::{assigned_personnel, worker_requirements};
use crate::services::{permission_service, shift_service};

fn validate(role_code: &str, count: i32) -> EngineResult<()> {
    if count < 0 {
        return Err(EngineError::Validation(format!(
            "Required count for {role_code} cannot be negative"
        )));
    }
    if !is_valid_role_code(role_code) {
        return Err(EngineError::Validation(format!(
            "Invalid role code '{role_code}'"
        )));
    }
    Ok(())
}

fn duplicate_requirement(shift_id: i64, role_code: &str) -> EngineError {
    EngineError::Conflict(format!(
        "Shift {shift_id} already has a {role_code} requirement"
    ))
}

/// Create a requirement row. `Conflict` if the role already has one.
pub async fn add_requirement(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    role_code: &str,
    count: i32,
) -> EngineResult<WorkerRequirement> {
    validate(role_code, count)?;

    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                shift_service::lock_shift(conn, shift_id).await?;

                let exists = diesel::select(diesel::dsl::exists(
                    worker_requirements::table
                        .filter(worker_requirements::shift_id.eq(shift_id))
                        .filter(worker_requirements::role_code.eq(role_code)),
                ))
                .get_result::<bool>(conn)
                .await?;
                if exists {
                    return Err(duplicate_requirement(shift_id, role_code));
                }

                diesel::insert_into(worker_requirements::table)
                    .values(NewWorkerRequirement {
                        shift_id,
                        role_code: role_code.to_string(),
                        required_count: count,
                    })
                    .returning(WorkerRequirement::as_returning())
                    .get_result(conn)
                    .await
                    .map_err(|e| match EngineError::from(e) {
                        EngineError::Conflict(_) => duplicate_requirement(shift_id, role_code),
                        other => other,
                    })
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!(shift_id, role_code, count, "Worker requirement added");
    Ok(row)
}

/// Create or update the requirement for a role.
pub async fn set_requirement(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    role_code: &str,
    count: i32,
) -> EngineResult<WorkerRequirement> {
    validate(role_code, count)?;

    let row = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                shift_service::lock_shift(conn, shift_id).await?;

                let row = diesel::insert_into(worker_requirements::table)
                    .values(NewWorkerRequirement {
                        shift_id,
                        role_code: role_code.to_string(),
                        required_count: count,
                    })
                    .on_conflict((worker_requirements::shift_id, worker_requirements::role_code))
                    .do_update()
                    .set((
                        worker_requirements::required_count.eq(count),
                        worker_requirements::write_date.eq(Utc::now()),
                    ))
                    .returning(WorkerRequirement::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(row)
            }
            .scope_boxed()
        })
        .await?;

    tracing::info!(shift_id, role_code, count, "Worker requirement set");
    Ok(row)
}

/// Requirement rows for a shift, ordered by role code.
pub async fn get_requirements(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Vec<WorkerRequirement>> {
    shift_service::load_shift(conn, shift_id).await?;

    let rows = worker_requirements::table
        .filter(worker_requirements::shift_id.eq(shift_id))
        .order(worker_requirements::role_code.asc())
        .select(WorkerRequirement::as_select())
        .load(conn)
        .await?;
    Ok(rows)
}

/// Claimed slots against required head count.
pub async fn get_fill_state(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<FillState> {
    let shift = shift_service::load_shift(conn, shift_id).await?;
    let requirements = get_requirements(conn, shift_id).await?;

    let assigned_count: i64 = assigned_personnel::table
        .filter(assigned_personnel::shift_id.eq(shift_id))
        .filter(assigned_personnel::user_id.is_not_null())
        .count()
        .get_result(conn)
        .await?;

    Ok(FillState::compute(
        assigned_count,
        &requirements,
        shift.requested_workers,
    ))
}
