//! KPI queries for the staffing dashboard.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Date, Double, Integer, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

/// Timesheet count grouped by status.
#[derive(Debug, Serialize, QueryableByName)]
pub struct TimesheetsByStatus {
    #[diesel(sql_type = Text)]
    pub status: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn query_timesheets_by_status(
    conn: &mut AsyncPgConnection,
) -> anyhow::Result<Vec<TimesheetsByStatus>> {
    let results = diesel::sql_query(
        "SELECT status, COUNT(*) AS count \
         FROM timesheets \
         GROUP BY status \
         ORDER BY count DESC",
    )
    .load(conn)
    .await?;
    Ok(results)
}

/// Up-for-grabs slots on shifts that have not ended yet.
#[derive(Debug, Serialize, QueryableByName)]
pub struct OpenSlots {
    #[diesel(sql_type = BigInt)]
    pub shift_id: i64,
    #[diesel(sql_type = Date)]
    pub date: chrono::NaiveDate,
    #[diesel(sql_type = Text)]
    pub role_code: String,
    #[diesel(sql_type = BigInt)]
    pub open: i64,
}

pub async fn query_open_slots(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<OpenSlots>> {
    let results = diesel::sql_query(
        "SELECT s.id AS shift_id, s.date, ap.role_code, COUNT(*) AS open \
         FROM assigned_personnel ap \
         JOIN shifts s ON s.id = ap.shift_id \
         WHERE ap.user_id IS NULL \
           AND s.end_time > NOW() \
           AND s.status != 'cancelled' \
         GROUP BY s.id, s.date, ap.role_code \
         ORDER BY s.date, s.id, ap.role_code",
    )
    .load(conn)
    .await?;
    Ok(results)
}

/// Claimed slots against required head count over the next N days.
#[derive(Debug, Serialize, QueryableByName)]
pub struct FillRate {
    #[diesel(sql_type = BigInt)]
    pub shifts: i64,
    #[diesel(sql_type = BigInt)]
    pub required: i64,
    #[diesel(sql_type = BigInt)]
    pub assigned: i64,
    #[diesel(sql_type = Double)]
    pub rate: f64,
}

pub async fn query_fill_rate(
    conn: &mut AsyncPgConnection,
    days: i32,
) -> anyhow::Result<FillRate> {
    // Per-role rows win over the legacy head count, as in FillState::compute.
    let result = diesel::sql_query(
        "WITH per_shift AS ( \
            SELECT s.id, \
                COALESCE( \
                    (SELECT SUM(wr.required_count) FROM worker_requirements wr WHERE wr.shift_id = s.id), \
                    GREATEST(COALESCE(s.requested_workers, 0), 0) \
                )::bigint AS required, \
                (SELECT COUNT(*) FROM assigned_personnel ap \
                 WHERE ap.shift_id = s.id AND ap.user_id IS NOT NULL) AS assigned \
            FROM shifts s \
            WHERE s.status != 'cancelled' \
              AND s.date >= CURRENT_DATE \
              AND s.date < CURRENT_DATE + $1 \
         ) \
         SELECT COUNT(*) AS shifts, \
            COALESCE(SUM(required), 0)::bigint AS required, \
            COALESCE(SUM(assigned), 0)::bigint AS assigned, \
            COALESCE(SUM(assigned)::float / NULLIF(SUM(required), 0), 0) AS rate \
         FROM per_shift",
    )
    .bind::<Integer, _>(days.max(1))
    .get_result(conn)
    .await?;
    Ok(result)
}
