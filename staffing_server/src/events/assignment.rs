//! Slot lifecycle events.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::assignment::AssignmentStatus;

/// Events that can happen to a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssignmentEvent {
    /// Worker clocked in (first entry or back from a break).
    ClockedIn,
    /// Worker clocked out for a break or at the end of a segment.
    ClockedOut,
    /// Crew chief sent the whole crew on break.
    BreakStarted,
    /// Worker is done for the shift.
    ShiftEnded,
    /// Worker never showed up.
    MarkedNoShow,
    /// Worker dropped the slot close to start; it is now up for grabs.
    Released,
    /// Someone claimed an up-for-grabs slot.
    Claimed,
}

impl AssignmentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AssignmentEvent::ClockedIn => "clock_in",
            AssignmentEvent::ClockedOut => "clock_out",
            AssignmentEvent::BreakStarted => "break_start",
            AssignmentEvent::ShiftEnded => "end_shift",
            AssignmentEvent::MarkedNoShow => "no_show",
            AssignmentEvent::Released => "release",
            AssignmentEvent::Claimed => "claim",
        }
    }
}

impl AssignmentStatus {
    /// Next status after `event`, or `InvalidState` naming why not.
    pub fn apply(self, event: AssignmentEvent) -> Result<AssignmentStatus, EngineError> {
        use AssignmentEvent as E;
        use AssignmentStatus as S;

        let next = match (self, event) {
            (S::Assigned | S::ClockedOut, E::ClockedIn) => S::ClockedIn,
            (S::ClockedIn, E::ClockedOut | E::BreakStarted) => S::ClockedOut,
            (S::Assigned | S::ClockedIn | S::ClockedOut, E::ShiftEnded) => S::ShiftEnded,
            (S::ShiftEnded, E::ShiftEnded) => S::ShiftEnded,
            (S::Assigned, E::MarkedNoShow) => S::NoShow,
            (S::Assigned, E::Released) => S::UpForGrabs,
            (S::UpForGrabs, E::Claimed) => S::Assigned,
            (S::ClockedIn, E::ClockedIn) => {
                return Err(EngineError::Conflict(
                    "Worker is already clocked in".to_string(),
                ))
            }
            (S::ShiftEnded | S::NoShow, _) => {
                return Err(EngineError::InvalidState(format!(
                    "Assignment is {}; no further {} allowed",
                    self,
                    event.name()
                )))
            }
            (S::UpForGrabs, _) => {
                return Err(EngineError::InvalidState(
                    "Slot is up for grabs and has no worker".to_string(),
                ))
            }
            _ => {
                return Err(EngineError::InvalidState(format!(
                    "Cannot {} an assignment that is {}",
                    event.name(),
                    self
                )))
            }
        };
        Ok(next)
    }
}
