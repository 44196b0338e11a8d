//! shifts: a scheduled block of work belonging to one job.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::schema::shifts;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Pending => "pending",
            ShiftStatus::Active => "active",
            ShiftStatus::Completed => "completed",
            ShiftStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(ShiftStatus::Pending),
            "active" | "in_progress" | "inprogress" => Some(ShiftStatus::Active),
            "completed" => Some(ShiftStatus::Completed),
            "cancelled" | "canceled" => Some(ShiftStatus::Cancelled),
            _ => None,
        }
    }

    /// Finalized and cancelled shifts take no new workers or time.
    pub fn is_closed(&self) -> bool {
        matches!(self, ShiftStatus::Completed | ShiftStatus::Cancelled)
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = shifts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Shift {
    pub id: i64,
    pub job_id: i64,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub status: String,
    /// Legacy single head-count, used when no per-role requirements exist.
    pub requested_workers: Option<i32>,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = shifts)]
pub struct NewShift {
    pub job_id: i64,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub status: String,
    pub requested_workers: Option<i32>,
}

/// A shift with the ownership chain the permission gate and notifications need.
#[derive(Debug, Clone)]
pub struct ShiftContext {
    pub shift: Shift,
    pub job_name: String,
    pub company_id: i64,
    pub company_name: String,
}

impl Shift {
    pub fn status(&self) -> Result<ShiftStatus, EngineError> {
        ShiftStatus::parse(&self.status).ok_or_else(|| {
            EngineError::Internal(format!(
                "Shift {} has unknown status '{}'",
                self.id, self.status
            ))
        })
    }
}

impl ShiftContext {
    pub fn job_id(&self) -> i64 {
        self.shift.job_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_statuses() {
        assert!(ShiftStatus::Completed.is_closed());
        assert!(ShiftStatus::Cancelled.is_closed());
        assert!(!ShiftStatus::Pending.is_closed());
        assert!(!ShiftStatus::Active.is_closed());
    }

    #[test]
    fn test_parse_accepts_legacy_spellings() {
        assert_eq!(ShiftStatus::parse("In_Progress"), Some(ShiftStatus::Active));
        assert_eq!(ShiftStatus::parse("canceled"), Some(ShiftStatus::Cancelled));
        assert_eq!(ShiftStatus::parse("archived"), None);
    }
}
