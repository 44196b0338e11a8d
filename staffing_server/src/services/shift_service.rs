//! Shift lookups shared by the other services.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::{EngineError, EngineResult};
use crate::models::shift::{Shift, ShiftContext, ShiftStatus};
use crate::schema::{companies, jobs, shifts};

/// Get a shift by ID.
pub async fn load_shift(conn: &mut AsyncPgConnection, shift_id: i64) -> EngineResult<Shift> {
    shifts::table
        .find(shift_id)
        .select(Shift::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Shift {shift_id} not found")))
}

/// Lock a shift row for the rest of the transaction.
pub async fn lock_shift(conn: &mut AsyncPgConnection, shift_id: i64) -> EngineResult<Shift> {
    shifts::table
        .find(shift_id)
        .select(Shift::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Shift {shift_id} not found")))
}

/// Lock a shift that still accepts workers and time.
pub async fn lock_open_shift(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Shift> {
    let shift = lock_shift(conn, shift_id).await?;
    let status = shift.status()?;
    if status.is_closed() {
        return Err(EngineError::InvalidState(format!(
            "Shift {shift_id} is {status}"
        )));
    }
    Ok(shift)
}

/// Get a shift together with its job and client company.
pub async fn load_shift_context(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<ShiftContext> {
    let result: Option<(Shift, String, i64, String)> = shifts::table
        .inner_join(jobs::table.inner_join(companies::table))
        .filter(shifts::id.eq(shift_id))
        .select((Shift::as_select(), jobs::name, companies::id, companies::name))
        .first(conn)
        .await
        .optional()?;

    let (shift, job_name, company_id, company_name) =
        result.ok_or_else(|| EngineError::NotFound(format!("Shift {shift_id} not found")))?;

    Ok(ShiftContext {
        shift,
        job_name,
        company_id,
        company_name,
    })
}

/// Update shift status.
pub async fn update_status(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
    status: ShiftStatus,
) -> EngineResult<()> {
    diesel::update(shifts::table.find(shift_id))
        .set((
            shifts::status.eq(status.as_str()),
            shifts::write_date.eq(chrono::Utc::now()),
        ))
        .execute(conn)
        .await?;
    Ok(())
}
