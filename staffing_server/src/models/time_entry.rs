//! time_entries: clock-in/clock-out pairs for an assignment.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::time_entries;

/// Reporting granularity for worked time.
pub const ROUNDING_STEP_MINUTES: i64 = 15;

/// Shortest accepted clock-in/clock-out pair.
pub const MIN_ENTRY_SECONDS: i64 = 60;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = time_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TimeEntry {
    pub id: i64,
    pub assigned_personnel_id: i64,
    pub shift_id: i64,
    pub user_id: i64,
    pub entry_number: i32,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

impl TimeEntry {
    /// Rounded length of a closed entry; open entries count as zero.
    pub fn rounded_duration(&self) -> Duration {
        match self.clock_out {
            Some(out) => round_up(out) - round_down(self.clock_in),
            None => Duration::zero(),
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = time_entries)]
pub struct NewTimeEntry {
    pub assigned_personnel_id: i64,
    pub shift_id: i64,
    pub user_id: i64,
    pub entry_number: i32,
    pub clock_in: DateTime<Utc>,
    pub is_active: bool,
}

/// Worked time for one slot, as reported on timesheets.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentHours {
    pub assigned_personnel_id: i64,
    pub user_id: Option<i64>,
    pub role_code: String,
    pub entries: usize,
    pub worked_minutes: i64,
    pub worked_hours: f64,
}

fn step() -> Duration {
    Duration::minutes(ROUNDING_STEP_MINUTES)
}

/// Floor to the previous 15-minute boundary.
pub fn round_down(t: DateTime<Utc>) -> DateTime<Utc> {
    let step_secs = step().num_seconds();
    let secs = t.timestamp();
    let excess = secs.rem_euclid(step_secs);
    t - Duration::seconds(excess) - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

/// Ceil to the next 15-minute boundary; boundaries stay put.
pub fn round_up(t: DateTime<Utc>) -> DateTime<Utc> {
    let down = round_down(t);
    if down == t {
        t
    } else {
        down + step()
    }
}

/// Sum of rounded closed entries, in minutes.
pub fn worked_minutes(entries: &[TimeEntry]) -> i64 {
    entries
        .iter()
        .map(|e| e.rounded_duration().num_minutes())
        .sum()
}

pub fn minutes_to_hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}
