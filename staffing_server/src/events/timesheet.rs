//! Timesheet approval events.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::timesheet::TimesheetStatus;

/// Events that can happen to a timesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimesheetEvent {
    /// Sent to the client company for approval.
    Submitted,
    CompanyApproved,
    ManagerApproved,
    Rejected,
    /// Admin reopened a completed timesheet.
    Unlocked,
}

impl TimesheetStatus {
    pub fn apply(self, event: TimesheetEvent) -> Result<TimesheetStatus, EngineError> {
        use TimesheetEvent as E;
        use TimesheetStatus as S;

        let next = match (self, event) {
            (S::Draft | S::Rejected, E::Submitted) => S::PendingCompanyApproval,
            (S::PendingCompanyApproval, E::CompanyApproved) => S::PendingManagerApproval,
            (S::PendingManagerApproval, E::ManagerApproved) => S::Completed,
            (S::PendingCompanyApproval | S::PendingManagerApproval, E::Rejected) => S::Rejected,
            (S::Completed, E::Unlocked) => S::Draft,
            (_, E::Rejected) => {
                return Err(EngineError::InvalidState(format!(
                    "Cannot reject a timesheet that is {self}; only pending timesheets can be rejected"
                )))
            }
            (_, E::Unlocked) => {
                return Err(EngineError::InvalidState(format!(
                    "Cannot unlock a timesheet that is {self}; only completed timesheets can be unlocked"
                )))
            }
            (_, E::CompanyApproved) => {
                return Err(EngineError::InvalidState(format!(
                    "Timesheet is {self}, not awaiting company approval"
                )))
            }
            (_, E::ManagerApproved) => {
                return Err(EngineError::InvalidState(format!(
                    "Timesheet is {self}, not awaiting manager approval"
                )))
            }
            (_, E::Submitted) => {
                return Err(EngineError::InvalidState(format!(
                    "Timesheet is {self} and cannot be submitted"
                )))
            }
        };
        Ok(next)
    }
}
