//! assigned_personnel: a worker slot on a shift.

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::schema::assigned_personnel;

/// Lifecycle of a slot. Stored as the lower snake_case string.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    ClockedIn,
    ClockedOut,
    ShiftEnded,
    NoShow,
    UpForGrabs,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::ClockedIn => "clocked_in",
            AssignmentStatus::ClockedOut => "clocked_out",
            AssignmentStatus::ShiftEnded => "shift_ended",
            AssignmentStatus::NoShow => "no_show",
            AssignmentStatus::UpForGrabs => "up_for_grabs",
        }
    }

    /// Maps every historical spelling ("Shift Ended", "ShiftEnded",
    /// "shift_ended", ...) onto the canonical variant.
    pub fn normalize(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "assigned" => Some(AssignmentStatus::Assigned),
            "clockedin" => Some(AssignmentStatus::ClockedIn),
            "clockedout" | "onbreak" => Some(AssignmentStatus::ClockedOut),
            "shiftended" => Some(AssignmentStatus::ShiftEnded),
            "noshow" => Some(AssignmentStatus::NoShow),
            "upforgrabs" => Some(AssignmentStatus::UpForGrabs),
            _ => None,
        }
    }

    /// Terminal for timesheet finalization.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentStatus::ShiftEnded | AssignmentStatus::NoShow)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = assigned_personnel)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AssignedPersonnel {
    pub id: i64,
    pub shift_id: i64,
    pub user_id: Option<i64>,
    pub role_code: String,
    pub status: String,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

impl AssignedPersonnel {
    pub fn status(&self) -> Result<AssignmentStatus, EngineError> {
        AssignmentStatus::normalize(&self.status).ok_or_else(|| {
            EngineError::Internal(format!(
                "Assignment {} has unknown status '{}'",
                self.id, self.status
            ))
        })
    }

    pub fn slot_state(&self) -> Result<SlotState, EngineError> {
        Ok(match self.user_id {
            None => SlotState::Open {
                role_code: self.role_code.clone(),
            },
            Some(user_id) => SlotState::Claimed {
                user_id,
                status: self.status()?,
            },
        })
    }
}

/// What a slot currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotState {
    /// Reserved for a role, waiting for someone to claim it.
    Open { role_code: String },
    Claimed {
        user_id: i64,
        status: AssignmentStatus,
    },
    /// Exists only in the client's editing session; never persisted.
    Placeholder,
}

/// How a caller refers to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotRef {
    Persisted { id: i64 },
    Placeholder,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = assigned_personnel)]
pub struct NewAssignedPersonnel {
    pub shift_id: i64,
    pub user_id: Option<i64>,
    pub role_code: String,
    pub status: String,
}

/// A slot as returned to API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    pub id: i64,
    pub shift_id: i64,
    pub role_code: String,
    pub slot: SlotState,
}

impl TryFrom<AssignedPersonnel> for AssignmentView {
    type Error = EngineError;

    fn try_from(row: AssignedPersonnel) -> Result<Self, Self::Error> {
        let slot = row.slot_state()?;
        Ok(Self {
            id: row.id,
            shift_id: row.shift_id,
            role_code: row.role_code,
            slot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user_id: Option<i64>, status: &str) -> AssignedPersonnel {
        AssignedPersonnel {
            id: 7,
            shift_id: 3,
            user_id,
            role_code: "GL".to_string(),
            status: status.to_string(),
            create_date: None,
            write_date: None,
        }
    }

    #[test]
    fn test_normalize_legacy_spellings() {
        for s in ["Shift Ended", "ShiftEnded", "shift_ended", "SHIFT_ENDED"] {
            assert_eq!(
                AssignmentStatus::normalize(s),
                Some(AssignmentStatus::ShiftEnded),
                "{s}"
            );
        }
        assert_eq!(
            AssignmentStatus::normalize("Up For Grabs"),
            Some(AssignmentStatus::UpForGrabs)
        );
        assert_eq!(
            AssignmentStatus::normalize("On Break"),
            Some(AssignmentStatus::ClockedOut)
        );
        assert_eq!(AssignmentStatus::normalize("finished"), None);
    }

    #[test]
    fn test_canonical_spelling_round_trips() {
        for status in [
            AssignmentStatus::Assigned,
            AssignmentStatus::ClockedIn,
            AssignmentStatus::ClockedOut,
            AssignmentStatus::ShiftEnded,
            AssignmentStatus::NoShow,
            AssignmentStatus::UpForGrabs,
        ] {
            assert_eq!(AssignmentStatus::normalize(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AssignmentStatus::ShiftEnded.is_terminal());
        assert!(AssignmentStatus::NoShow.is_terminal());
        assert!(!AssignmentStatus::ClockedOut.is_terminal());
        assert!(!AssignmentStatus::UpForGrabs.is_terminal());
    }

    #[test]
    fn test_slot_state_from_row() {
        assert_eq!(
            row(None, "up_for_grabs").slot_state().unwrap(),
            SlotState::Open {
                role_code: "GL".to_string()
            }
        );
        assert_eq!(
            row(Some(42), "Clocked In").slot_state().unwrap(),
            SlotState::Claimed {
                user_id: 42,
                status: AssignmentStatus::ClockedIn
            }
        );
        assert!(row(Some(42), "bogus").slot_state().is_err());
    }

    #[test]
    fn test_slot_ref_json_shape() {
        let placeholder: SlotRef = serde_json::from_str(r#"{"kind":"placeholder"}"#).unwrap();
        assert_eq!(placeholder, SlotRef::Placeholder);

        let persisted: SlotRef =
            serde_json::from_str(r#"{"kind":"persisted","id":12}"#).unwrap();
        assert_eq!(persisted, SlotRef::Persisted { id: 12 });
    }
}
