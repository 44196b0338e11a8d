//! Request and response bodies for the staffing API, plus the flows that
//! combine more than one service call.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel_async::AsyncPgConnection;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::assignment::{AssignmentView, SlotRef};
use crate::models::permission::ScopeType;
use crate::models::requirement::FillState;
use crate::models::timesheet::ApproverRole;
use crate::models::user::CurrentUser;
use crate::services::conflict_service::{self, ShiftConflict};
use crate::services::{assignment_service, permission_service};

// ── Requirements ──

#[derive(Debug, Deserialize)]
pub struct RequirementRequest {
    pub role_code: String,
    pub required_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetRequirementRequest {
    pub required_count: i32,
}

#[derive(Debug, Serialize)]
pub struct FillResponse {
    pub assigned_count: i64,
    pub required_count: i64,
    pub percentage: u32,
}

impl From<FillState> for FillResponse {
    fn from(fill: FillState) -> Self {
        Self {
            assigned_count: fill.assigned_count,
            required_count: fill.required_count,
            percentage: fill.percentage(),
        }
    }
}

// ── Assignments ──

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub user_id: i64,
    pub role_code: String,
    #[serde(default)]
    pub ignore_conflicts: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRequest {
    pub slot: SlotRef,
    pub new_user_id: i64,
    pub role_code: String,
}

#[derive(Debug, Deserialize)]
pub struct UnassignRequest {
    pub slot: SlotRef,
}

#[derive(Debug, Serialize)]
pub struct UnassignResponse {
    /// `None` when the slot was a client-side placeholder.
    pub removed: Option<AssignmentView>,
}

/// Result of the assign flow: either the new slot, or the conflicts the
/// caller must confirm before retrying with `ignore_conflicts`.
#[derive(Debug)]
pub enum AssignOutcome {
    Assigned(AssignmentView),
    NeedsConfirmation(Vec<ShiftConflict>),
}

#[derive(Debug, Serialize)]
struct ConflictBody {
    requires_confirmation: bool,
    conflicts: Vec<ShiftConflict>,
}

impl IntoResponse for AssignOutcome {
    fn into_response(self) -> Response {
        match self {
            AssignOutcome::Assigned(view) => (StatusCode::CREATED, Json(view)).into_response(),
            AssignOutcome::NeedsConfirmation(conflicts) => (
                StatusCode::CONFLICT,
                Json(ConflictBody {
                    requires_confirmation: true,
                    conflicts,
                }),
            )
                .into_response(),
        }
    }
}

/// Assign a worker, stopping first to report scheduling conflicts unless the
/// caller already confirmed them. A failing conflict check never blocks.
pub async fn assign_with_conflict_check(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    req: AssignRequest,
) -> EngineResult<AssignOutcome> {
    permission_service::require_manage_shift(conn, actor, shift_id).await?;

    if !req.ignore_conflicts {
        match conflict_service::check_conflicts(conn, shift_id, req.user_id).await {
            Ok(conflicts) if !conflicts.is_empty() => {
                return Ok(AssignOutcome::NeedsConfirmation(conflicts));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    shift_id,
                    user_id = req.user_id,
                    "Conflict check failed, assigning anyway: {e}"
                );
            }
        }
    }

    let row =
        assignment_service::assign(conn, actor, shift_id, req.user_id, &req.role_code).await?;
    Ok(AssignOutcome::Assigned(AssignmentView::try_from(row)?))
}

#[derive(Debug, Deserialize)]
pub struct ConflictQuery {
    pub user_id: i64,
}

// ── Timesheets ──

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub role: ApproverRole,
    pub signature: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

// ── Permissions ──

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub user_id: i64,
    pub scope_type: ScopeType,
    pub scope_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CanManageResponse {
    pub shift_id: i64,
    pub can_manage: bool,
}

// ── KPI ──

#[derive(Debug, Deserialize)]
pub struct KpiQuery {
    pub days: Option<i32>,
}

/// Convert rows to API views, failing on rows with unknown statuses.
pub fn views<I>(rows: I) -> EngineResult<Vec<AssignmentView>>
where
    I: IntoIterator<Item = crate::models::assignment::AssignedPersonnel>,
{
    rows.into_iter().map(AssignmentView::try_from).collect()
}

/// KPI failures are plain query errors; report them as internal.
pub fn kpi_error(e: anyhow::Error) -> EngineError {
    EngineError::Internal(format!("KPI query failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_request_defaults_to_checking_conflicts() {
        let req: AssignRequest =
            serde_json::from_str(r#"{"user_id": 5, "role_code": "GL"}"#).unwrap();
        assert!(!req.ignore_conflicts);
    }

    #[test]
    fn test_replace_request_accepts_placeholder_slot() {
        let req: ReplaceRequest = serde_json::from_str(
            r#"{"slot": {"kind": "placeholder"}, "new_user_id": 8, "role_code": "FO"}"#,
        )
        .unwrap();
        assert_eq!(req.slot, SlotRef::Placeholder);
    }

    #[test]
    fn test_conflict_outcome_is_409() {
        let resp = AssignOutcome::NeedsConfirmation(Vec::new()).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_grant_request_parses_scope_type() {
        let req: GrantRequest =
            serde_json::from_str(r#"{"user_id": 2, "scope_type": "client", "scope_id": 9}"#)
                .unwrap();
        assert_eq!(req.scope_type, ScopeType::Client);
    }
}
