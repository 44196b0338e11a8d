//! Advisory double-booking detection.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

use crate::error::EngineResult;
use crate::models::shift::ShiftStatus;
use crate::schema::{assigned_personnel, jobs, shifts};
use crate::services::shift_service;

/// Another shift the user is already working that overlaps the candidate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ShiftConflict {
    pub shift_id: i64,
    pub job_name: String,
    pub role_code: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Half-open overlap: touching ranges do not conflict.
pub fn overlaps(
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    existing_start: DateTime<Utc>,
    existing_end: DateTime<Utc>,
) -> bool {
    candidate_start < existing_end && candidate_end > existing_start
}

/// Shifts on the same date that `user_id` is assigned to and that overlap `shift_id`.
pub async fn check_conflicts(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
    user_id: i64,
) -> EngineResult<Vec<ShiftConflict>> {
    let target = shift_service::load_shift(conn, shift_id).await?;

    let rows: Vec<(i64, String, String, DateTime<Utc>, DateTime<Utc>)> =
        assigned_personnel::table
            .inner_join(shifts::table.inner_join(jobs::table))
            .filter(assigned_personnel::user_id.eq(user_id))
            .filter(shifts::id.ne(shift_id))
            .filter(shifts::date.eq(target.date))
            .filter(shifts::status.ne(ShiftStatus::Cancelled.as_str()))
            .select((
                shifts::id,
                jobs::name,
                assigned_personnel::role_code,
                shifts::start_time,
                shifts::end_time,
            ))
            .order(shifts::start_time.asc())
            .load(conn)
            .await?;

    let conflicts: Vec<ShiftConflict> = rows
        .into_iter()
        .filter(|(_, _, _, start, end)| {
            overlaps(target.start_time, target.end_time, *start, *end)
        })
        .map(
            |(shift_id, job_name, role_code, start_time, end_time)| ShiftConflict {
                shift_id,
                job_name,
                role_code,
                start_time,
                end_time,
            },
        )
        .collect();

    if !conflicts.is_empty() {
        crate::metrics::conflicts_detected(conflicts.len());
        tracing::info!(
            shift_id,
            user_id,
            count = conflicts.len(),
            "Scheduling conflicts detected"
        );
    }
    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_overlapping_ranges() {
        assert!(overlaps(at(8), at(12), at(10), at(14)));
        assert!(overlaps(at(10), at(14), at(8), at(12)));
        assert!(overlaps(at(9), at(10), at(8), at(12)));
    }

    #[test]
    fn test_back_to_back_shifts_do_not_conflict() {
        assert!(!overlaps(at(8), at(12), at(12), at(16)));
        assert!(!overlaps(at(12), at(16), at(8), at(12)));
    }

    #[test]
    fn test_disjoint_ranges() {
        assert!(!overlaps(at(6), at(8), at(12), at(16)));
    }
}
