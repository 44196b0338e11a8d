//! Staffing HTTP routes.

pub mod api;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::StaffingConfig;
use crate::dashboard::kpi;
use crate::db::DieselPool;
use crate::error::EngineError;
use crate::models::assignment::{AssignmentView, SlotRef};
use crate::models::document::TimesheetDocument;
use crate::models::permission::CrewChiefPermission;
use crate::models::requirement::WorkerRequirement;
use crate::models::time_entry::{AssignmentHours, TimeEntry};
use crate::models::timesheet::Timesheet;
use crate::models::user::CurrentUser;
use crate::services::assignment_service::{self, DropResult};
use crate::services::conflict_service::{self, ShiftConflict};
use crate::services::document_service::DocumentRenderer;
use crate::services::notification_service::{Broadcaster, Notifier};
use crate::services::timesheet_service::{self, FinalizeOutcome};
use crate::services::{permission_service, requirement_service, time_service};

/// Shared state for staffing route handlers.
#[derive(Clone)]
pub struct StaffingState {
    pub pool: Arc<DieselPool>,
    pub config: StaffingConfig,
    pub notifier: Arc<dyn Notifier>,
    pub broadcaster: Option<Arc<dyn Broadcaster>>,
    pub documents: Option<Arc<dyn DocumentRenderer>>,
}

type ApiResult<T> = Result<Json<T>, EngineError>;

/// Request timeout and tracing around a router.
pub fn with_http_layers(router: Router, request_timeout: Duration) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Build the staffing Axum router (nested at `/staffing`).
pub fn staffing_router(state: StaffingState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Requirement ledger
        .route(
            "/api/shifts/{id}/requirements",
            get(list_requirements).post(add_requirement),
        )
        .route(
            "/api/shifts/{id}/requirements/{role_code}",
            put(set_requirement),
        )
        .route("/api/shifts/{id}/fill", get(fill_state))
        // Assignments
        .route(
            "/api/shifts/{id}/assignments",
            get(list_assignments).post(assign),
        )
        .route("/api/shifts/{id}/assignments/replace", post(replace))
        .route("/api/shifts/{id}/assignments/unassign", post(unassign))
        .route(
            "/api/shifts/{id}/assignments/{assignment_id}/claim",
            post(claim),
        )
        .route("/api/assignments/{id}/drop", post(drop_assignment))
        .route("/api/assignments/{id}", delete(delete_assignment))
        // Time tracking
        .route("/api/assignments/{id}/clock-in", post(clock_in))
        .route("/api/assignments/{id}/clock-out", post(clock_out))
        .route("/api/assignments/{id}/end-shift", post(end_shift))
        .route("/api/assignments/{id}/no-show", post(no_show))
        .route("/api/assignments/{id}/time-entries", get(time_entries))
        .route("/api/shifts/{id}/break", post(master_break))
        .route("/api/shifts/{id}/end-all", post(master_end))
        .route("/api/shifts/{id}/hours", get(shift_hours))
        // Conflicts
        .route("/api/shifts/{id}/conflicts", get(conflicts))
        // Timesheets
        .route("/api/shifts/{id}/finalize", post(finalize))
        .route("/api/timesheets/{id}", get(get_timesheet))
        .route("/api/timesheets/{id}/submit", post(submit_timesheet))
        .route("/api/timesheets/{id}/approve", post(approve_timesheet))
        .route("/api/timesheets/{id}/reject", post(reject_timesheet))
        .route("/api/timesheets/{id}/unlock", post(unlock_timesheet))
        .route("/api/timesheets/{id}/document", get(timesheet_document))
        // Permissions
        .route("/api/shifts/{id}/can-manage", get(can_manage))
        .route("/api/permissions", post(grant_permission))
        .route("/api/permissions/{id}", delete(revoke_permission))
        .route("/api/users/{id}/permissions", get(list_permissions))
        // KPI API
        .route("/api/kpi/timesheets_by_status", get(kpi_timesheets_by_status))
        .route("/api/kpi/open_slots", get(kpi_open_slots))
        .route("/api/kpi/fill_rate", get(kpi_fill_rate))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ── Requirement ledger ──

async fn list_requirements(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<Vec<WorkerRequirement>> {
    let mut conn = state.pool.get().await?;
    requirement_service::get_requirements(&mut conn, shift_id)
        .await
        .map(Json)
}

async fn add_requirement(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
    Json(req): Json<api::RequirementRequest>,
) -> Result<(StatusCode, Json<WorkerRequirement>), EngineError> {
    let mut conn = state.pool.get().await?;
    requirement_service::add_requirement(
        &mut conn,
        &user,
        shift_id,
        &req.role_code,
        req.required_count,
    )
    .await
    .map(|r| (StatusCode::CREATED, Json(r)))
}

async fn set_requirement(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path((shift_id, role_code)): Path<(i64, String)>,
    Json(req): Json<api::SetRequirementRequest>,
) -> ApiResult<WorkerRequirement> {
    let mut conn = state.pool.get().await?;
    requirement_service::set_requirement(&mut conn, &user, shift_id, &role_code, req.required_count)
        .await
        .map(Json)
}

async fn fill_state(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<api::FillResponse> {
    let mut conn = state.pool.get().await?;
    let fill = requirement_service::get_fill_state(&mut conn, shift_id).await?;
    Ok(Json(fill.into()))
}

// ── Assignments ──

async fn list_assignments(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<Vec<AssignmentView>> {
    let mut conn = state.pool.get().await?;
    let rows = assignment_service::list_for_shift(&mut conn, shift_id).await?;
    api::views(rows).map(Json)
}

async fn assign(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
    Json(req): Json<api::AssignRequest>,
) -> Result<api::AssignOutcome, EngineError> {
    let mut conn = state.pool.get().await?;
    api::assign_with_conflict_check(&mut conn, &user, shift_id, req).await
}

async fn replace(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
    Json(req): Json<api::ReplaceRequest>,
) -> ApiResult<AssignmentView> {
    let mut conn = state.pool.get().await?;
    let row = assignment_service::replace(
        &mut conn,
        &user,
        req.slot,
        shift_id,
        req.new_user_id,
        &req.role_code,
    )
    .await?;
    Ok(Json(AssignmentView::try_from(row)?))
}

async fn unassign(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
    Json(req): Json<api::UnassignRequest>,
) -> ApiResult<api::UnassignResponse> {
    let mut conn = state.pool.get().await?;
    if let SlotRef::Persisted { id } = req.slot {
        let row = assignment_service::get_assignment(&mut conn, id).await?;
        if row.shift_id != shift_id {
            return Err(EngineError::NotFound(format!(
                "Assignment {id} is not on shift {shift_id}"
            )));
        }
    }
    let removed = assignment_service::unassign(&mut conn, &user, req.slot).await?;
    Ok(Json(api::UnassignResponse {
        removed: removed.map(AssignmentView::try_from).transpose()?,
    }))
}

async fn delete_assignment(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> ApiResult<api::UnassignResponse> {
    let mut conn = state.pool.get().await?;
    let removed =
        assignment_service::unassign(&mut conn, &user, SlotRef::Persisted { id: assignment_id })
            .await?;
    Ok(Json(api::UnassignResponse {
        removed: removed.map(AssignmentView::try_from).transpose()?,
    }))
}

async fn claim(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path((shift_id, assignment_id)): Path<(i64, i64)>,
) -> ApiResult<AssignmentView> {
    let mut conn = state.pool.get().await?;
    let row = assignment_service::claim(&mut conn, &user, shift_id, assignment_id).await?;
    Ok(Json(AssignmentView::try_from(row)?))
}

async fn drop_assignment(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> ApiResult<DropResult> {
    let mut conn = state.pool.get().await?;
    assignment_service::drop_assignment(
        &mut conn,
        state.notifier.as_ref(),
        state.broadcaster.as_deref(),
        assignment_id,
        &user,
        Utc::now(),
    )
    .await
    .map(Json)
}

// ── Time tracking ──

async fn clock_in(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> Result<(StatusCode, Json<TimeEntry>), EngineError> {
    let mut conn = state.pool.get().await?;
    time_service::clock_in(&mut conn, &user, assignment_id, Utc::now())
        .await
        .map(|e| (StatusCode::CREATED, Json(e)))
}

async fn clock_out(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> ApiResult<TimeEntry> {
    let mut conn = state.pool.get().await?;
    time_service::clock_out(&mut conn, &user, assignment_id, Utc::now())
        .await
        .map(Json)
}

async fn end_shift(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> ApiResult<AssignmentView> {
    let mut conn = state.pool.get().await?;
    let row = time_service::end_shift(&mut conn, &user, assignment_id, Utc::now()).await?;
    Ok(Json(AssignmentView::try_from(row)?))
}

async fn no_show(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> ApiResult<AssignmentView> {
    let mut conn = state.pool.get().await?;
    let row = time_service::mark_no_show(&mut conn, &user, assignment_id).await?;
    Ok(Json(AssignmentView::try_from(row)?))
}

async fn time_entries(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(assignment_id): Path<i64>,
) -> ApiResult<Vec<TimeEntry>> {
    let mut conn = state.pool.get().await?;
    time_service::list_entries(&mut conn, assignment_id)
        .await
        .map(Json)
}

async fn master_break(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<Vec<AssignmentView>> {
    let mut conn = state.pool.get().await?;
    let rows = time_service::master_start_break(&mut conn, &user, shift_id, Utc::now()).await?;
    api::views(rows).map(Json)
}

async fn master_end(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<Vec<AssignmentView>> {
    let mut conn = state.pool.get().await?;
    let rows = time_service::master_end_shift(&mut conn, &user, shift_id, Utc::now()).await?;
    api::views(rows).map(Json)
}

async fn shift_hours(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<Vec<AssignmentHours>> {
    let mut conn = state.pool.get().await?;
    time_service::shift_hours(&mut conn, shift_id).await.map(Json)
}

// ── Conflicts ──

async fn conflicts(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(shift_id): Path<i64>,
    Query(query): Query<api::ConflictQuery>,
) -> ApiResult<Vec<ShiftConflict>> {
    let mut conn = state.pool.get().await?;
    conflict_service::check_conflicts(&mut conn, shift_id, query.user_id)
        .await
        .map(Json)
}

// ── Timesheets ──

async fn finalize(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> Result<(StatusCode, Json<FinalizeOutcome>), EngineError> {
    let mut conn = state.pool.get().await?;
    let outcome = timesheet_service::finalize(&mut conn, &user, shift_id, Utc::now()).await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

async fn get_timesheet(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(timesheet_id): Path<i64>,
) -> ApiResult<Timesheet> {
    let mut conn = state.pool.get().await?;
    timesheet_service::get_timesheet(&mut conn, timesheet_id)
        .await
        .map(Json)
}

async fn submit_timesheet(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(timesheet_id): Path<i64>,
) -> ApiResult<Timesheet> {
    let mut conn = state.pool.get().await?;
    timesheet_service::submit(&mut conn, &user, timesheet_id, Utc::now())
        .await
        .map(Json)
}

async fn approve_timesheet(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(timesheet_id): Path<i64>,
    Json(req): Json<api::ApproveRequest>,
) -> ApiResult<Timesheet> {
    let mut conn = state.pool.get().await?;
    timesheet_service::approve(
        &mut conn,
        state.documents.as_deref(),
        &user,
        timesheet_id,
        req.role,
        &req.signature,
        Utc::now(),
    )
    .await
    .map(Json)
}

async fn reject_timesheet(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(timesheet_id): Path<i64>,
    Json(req): Json<api::ReasonRequest>,
) -> ApiResult<Timesheet> {
    let mut conn = state.pool.get().await?;
    timesheet_service::reject(
        &mut conn,
        state.notifier.as_ref(),
        &user,
        timesheet_id,
        &req.reason,
        Utc::now(),
    )
    .await
    .map(Json)
}

async fn unlock_timesheet(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(timesheet_id): Path<i64>,
    Json(req): Json<api::ReasonRequest>,
) -> ApiResult<Timesheet> {
    let mut conn = state.pool.get().await?;
    timesheet_service::unlock(&mut conn, &user, timesheet_id, &req.reason, Utc::now())
        .await
        .map(Json)
}

async fn timesheet_document(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Path(timesheet_id): Path<i64>,
) -> Result<impl IntoResponse, EngineError> {
    let mut conn = state.pool.get().await?;
    let TimesheetDocument {
        content_type,
        content,
        ..
    } = timesheet_service::latest_document(&mut conn, timesheet_id).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], content))
}

// ── Permissions ──

async fn can_manage(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(shift_id): Path<i64>,
) -> ApiResult<api::CanManageResponse> {
    let mut conn = state.pool.get().await?;
    let can_manage = permission_service::can_manage_shift(&mut conn, &user, shift_id).await?;
    Ok(Json(api::CanManageResponse {
        shift_id,
        can_manage,
    }))
}

async fn grant_permission(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Json(req): Json<api::GrantRequest>,
) -> Result<(StatusCode, Json<CrewChiefPermission>), EngineError> {
    let mut conn = state.pool.get().await?;
    permission_service::grant(&mut conn, &user, req.user_id, req.scope_type, req.scope_id)
        .await
        .map(|g| (StatusCode::CREATED, Json(g)))
}

async fn revoke_permission(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(grant_id): Path<i64>,
) -> Result<StatusCode, EngineError> {
    let mut conn = state.pool.get().await?;
    permission_service::revoke(&mut conn, &user, grant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_permissions(
    State(state): State<StaffingState>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<CrewChiefPermission>> {
    let mut conn = state.pool.get().await?;
    permission_service::list_grants(&mut conn, &user, user_id)
        .await
        .map(Json)
}

// ── KPI API ──

async fn kpi_timesheets_by_status(
    State(state): State<StaffingState>,
    _user: CurrentUser,
) -> ApiResult<Vec<kpi::TimesheetsByStatus>> {
    let mut conn = state.pool.get().await?;
    kpi::query_timesheets_by_status(&mut conn)
        .await
        .map(Json)
        .map_err(api::kpi_error)
}

async fn kpi_open_slots(
    State(state): State<StaffingState>,
    _user: CurrentUser,
) -> ApiResult<Vec<kpi::OpenSlots>> {
    let mut conn = state.pool.get().await?;
    kpi::query_open_slots(&mut conn)
        .await
        .map(Json)
        .map_err(api::kpi_error)
}

async fn kpi_fill_rate(
    State(state): State<StaffingState>,
    _user: CurrentUser,
    Query(query): Query<api::KpiQuery>,
) -> ApiResult<kpi::FillRate> {
    let mut conn = state.pool.get().await?;
    kpi::query_fill_rate(&mut conn, query.days.unwrap_or(14))
        .await
        .map(Json)
        .map_err(api::kpi_error)
}
