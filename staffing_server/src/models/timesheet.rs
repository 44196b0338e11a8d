//! timesheets: per-shift approval aggregate.

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::schema::timesheets;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimesheetStatus {
    Draft,
    PendingCompanyApproval,
    PendingManagerApproval,
    Completed,
    Rejected,
}

impl TimesheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "draft",
            TimesheetStatus::PendingCompanyApproval => "pending_company_approval",
            TimesheetStatus::PendingManagerApproval => "pending_manager_approval",
            TimesheetStatus::Completed => "completed",
            TimesheetStatus::Rejected => "rejected",
        }
    }

    pub fn normalize(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "draft" => Some(TimesheetStatus::Draft),
            "pendingcompanyapproval" => Some(TimesheetStatus::PendingCompanyApproval),
            "pendingmanagerapproval" => Some(TimesheetStatus::PendingManagerApproval),
            "completed" => Some(TimesheetStatus::Completed),
            "rejected" => Some(TimesheetStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TimesheetStatus::PendingCompanyApproval | TimesheetStatus::PendingManagerApproval
        )
    }
}

impl fmt::Display for TimesheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which approval stage an approver signs for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Company,
    Manager,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = timesheets)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Timesheet {
    pub id: i64,
    pub shift_id: i64,
    pub status: String,
    pub submitted_by: Option<i64>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub company_approved_by: Option<i64>,
    pub company_approved_at: Option<DateTime<Utc>>,
    pub company_signature: Option<String>,
    pub manager_approved_by: Option<i64>,
    pub manager_approved_at: Option<DateTime<Utc>>,
    pub manager_signature: Option<String>,
    pub rejected_by: Option<i64>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub document_id: Option<i64>,
    /// Append-only audit trail.
    pub notes: Option<String>,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

impl Timesheet {
    pub fn status(&self) -> Result<TimesheetStatus, EngineError> {
        TimesheetStatus::normalize(&self.status).ok_or_else(|| {
            EngineError::Internal(format!(
                "Timesheet {} has unknown status '{}'",
                self.id, self.status
            ))
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = timesheets)]
pub struct NewTimesheet {
    pub shift_id: i64,
    pub status: String,
    pub submitted_by: Option<i64>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Append one audit line to the existing notes.
pub fn append_audit_note(existing: Option<&str>, line: &str) -> String {
    match existing {
        Some(notes) if !notes.trim().is_empty() => format!("{}\n{}", notes.trim_end(), line),
        _ => line.to_string(),
    }
}

pub fn unlock_audit_line(
    admin_name: &str,
    admin_id: i64,
    at: DateTime<Utc>,
    reason: &str,
) -> String {
    format!(
        "[{}] UNLOCKED by {} (user {}): {}",
        at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        admin_name,
        admin_id,
        reason.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_normalize() {
        assert_eq!(
            TimesheetStatus::normalize("PENDING_COMPANY_APPROVAL"),
            Some(TimesheetStatus::PendingCompanyApproval)
        );
        assert_eq!(
            TimesheetStatus::normalize("completed"),
            Some(TimesheetStatus::Completed)
        );
        assert_eq!(TimesheetStatus::normalize("approved"), None);
    }

    #[test]
    fn test_pending_states() {
        assert!(TimesheetStatus::PendingCompanyApproval.is_pending());
        assert!(TimesheetStatus::PendingManagerApproval.is_pending());
        assert!(!TimesheetStatus::Completed.is_pending());
        assert!(!TimesheetStatus::Draft.is_pending());
    }

    #[test]
    fn test_audit_note_appends() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 30, 0).unwrap();
        let line = unlock_audit_line("Dana Ortiz", 4, at, " wrong hours ");
        assert_eq!(
            line,
            "[2026-05-01T08:30:00Z] UNLOCKED by Dana Ortiz (user 4): wrong hours"
        );

        assert_eq!(append_audit_note(None, &line), line);
        let appended = append_audit_note(Some("first line\n"), &line);
        assert_eq!(appended, format!("first line\n{line}"));
    }
}
