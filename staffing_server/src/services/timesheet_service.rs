//! Timesheet lifecycle: finalize, approval chain, rejection and unlock.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::events::timesheet::TimesheetEvent;
use crate::models::assignment::AssignedPersonnel;
use crate::models::document::TimesheetDocument;
use crate::models::notification::Notification;
use crate::models::shift::{ShiftContext, ShiftStatus};
use crate::models::timesheet::{
    append_audit_note, unlock_audit_line, ApproverRole, NewTimesheet, Timesheet, TimesheetStatus,
};
use crate::models::user::{CurrentUser, UserRole};
use crate::schema::{assigned_personnel, timesheets};
use crate::services::document_service::{self, DocumentRenderer};
use crate::services::notification_service::{self, Notifier};
use crate::services::{permission_service, shift_service};

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeOutcome {
    pub timesheet: Timesheet,
    /// False when the shift had already been finalized.
    pub created: bool,
}

/// Get a timesheet by ID.
pub async fn get_timesheet(
    conn: &mut AsyncPgConnection,
    timesheet_id: i64,
) -> EngineResult<Timesheet> {
    timesheets::table
        .find(timesheet_id)
        .select(Timesheet::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Timesheet {timesheet_id} not found")))
}

/// The timesheet of a shift, if it has been finalized.
pub async fn get_for_shift(
    conn: &mut AsyncPgConnection,
    shift_id: i64,
) -> EngineResult<Option<Timesheet>> {
    let ts = timesheets::table
        .filter(timesheets::shift_id.eq(shift_id))
        .select(Timesheet::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(ts)
}

async fn lock_timesheet(
    conn: &mut AsyncPgConnection,
    timesheet_id: i64,
) -> EngineResult<Timesheet> {
    timesheets::table
        .find(timesheet_id)
        .select(Timesheet::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| EngineError::NotFound(format!("Timesheet {timesheet_id} not found")))
}

/// Close out a shift: every claimed worker must be done.
pub async fn finalize(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    shift_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<FinalizeOutcome> {
    let outcome = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                permission_service::require_manage_shift(conn, actor, shift_id).await?;
                shift_service::lock_shift(conn, shift_id).await?;

                if let Some(existing) = get_for_shift(conn, shift_id).await? {
                    return Ok(FinalizeOutcome {
                        timesheet: existing,
                        created: false,
                    });
                }

                let claimed: Vec<AssignedPersonnel> = assigned_personnel::table
                    .filter(assigned_personnel::shift_id.eq(shift_id))
                    .filter(assigned_personnel::user_id.is_not_null())
                    .select(AssignedPersonnel::as_select())
                    .for_update()
                    .load(conn)
                    .await?;

                let mut still_active = 0;
                for row in &claimed {
                    if !row.status()?.is_terminal() {
                        still_active += 1;
                    }
                }
                if still_active > 0 {
                    return Err(EngineError::InvalidState(format!(
                        "{still_active} worker(s) still active"
                    )));
                }

                let status = TimesheetStatus::Draft.apply(TimesheetEvent::Submitted)?;
                let inserted = diesel::insert_into(timesheets::table)
                    .values(NewTimesheet {
                        shift_id,
                        status: status.as_str().to_string(),
                        submitted_by: Some(actor.id),
                        submitted_at: Some(now),
                    })
                    .on_conflict(timesheets::shift_id)
                    .do_nothing()
                    .returning(Timesheet::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?;

                match inserted {
                    Some(timesheet) => {
                        shift_service::update_status(conn, shift_id, ShiftStatus::Completed)
                            .await?;
                        Ok(FinalizeOutcome {
                            timesheet,
                            created: true,
                        })
                    }
                    None => {
                        let timesheet = get_for_shift(conn, shift_id).await?.ok_or_else(|| {
                            EngineError::Internal(format!(
                                "Timesheet for shift {shift_id} vanished during finalize"
                            ))
                        })?;
                        Ok(FinalizeOutcome {
                            timesheet,
                            created: false,
                        })
                    }
                }
            }
            .scope_boxed()
        })
        .await?;

    if outcome.created {
        crate::metrics::timesheet_status_changed(&outcome.timesheet.status);
        tracing::info!(
            shift_id,
            timesheet_id = outcome.timesheet.id,
            submitted_by = actor.id,
            "Shift finalized"
        );
    } else {
        tracing::debug!(
            shift_id,
            timesheet_id = outcome.timesheet.id,
            "Shift already finalized"
        );
    }
    Ok(outcome)
}

/// Re-send a draft or rejected timesheet for company approval.
pub async fn submit(
    conn: &mut AsyncPgConnection,
    actor: &CurrentUser,
    timesheet_id: i64,
    now: DateTime<Utc>,
) -> EngineResult<Timesheet> {
    let ts = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let ts = lock_timesheet(conn, timesheet_id).await?;
                permission_service::require_manage_shift(conn, actor, ts.shift_id).await?;
                let next = ts.status()?.apply(TimesheetEvent::Submitted)?;

                let updated = diesel::update(timesheets::table.find(timesheet_id))
                    .set((
                        timesheets::status.eq(next.as_str()),
                        timesheets::submitted_by.eq(Some(actor.id)),
                        timesheets::submitted_at.eq(Some(now)),
                        timesheets::write_date.eq(now),
                    ))
                    .returning(Timesheet::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(updated)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::timesheet_status_changed(&ts.status);
    tracing::info!(timesheet_id, submitted_by = actor.id, "Timesheet submitted");
    Ok(ts)
}

/// Whether `user` may act at the given approval stage.
pub fn may_approve(user: &CurrentUser, role: ApproverRole, ctx_company_id: i64) -> bool {
    match role {
        ApproverRole::Company => {
            user.is_admin()
                || (user.role == UserRole::CompanyUser && user.company_id == Some(ctx_company_id))
        }
        ApproverRole::Manager => user.role.is_manager(),
    }
}

fn stage_of(status: TimesheetStatus) -> Option<ApproverRole> {
    if !status.is_pending() {
        return None;
    }
    Some(if status == TimesheetStatus::PendingCompanyApproval {
        ApproverRole::Company
    } else {
        ApproverRole::Manager
    })
}

fn forbid_stage(role: ApproverRole) -> EngineError {
    EngineError::Forbidden(match role {
        ApproverRole::Company => {
            "Only the client company or an administrator can act on company approval".to_string()
        }
        ApproverRole::Manager => "Only managers can act on manager approval".to_string(),
    })
}

/// Sign off one approval stage.
pub async fn approve(
    conn: &mut AsyncPgConnection,
    renderer: Option<&dyn DocumentRenderer>,
    actor: &CurrentUser,
    timesheet_id: i64,
    role: ApproverRole,
    signature: &str,
    now: DateTime<Utc>,
) -> EngineResult<Timesheet> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(EngineError::Validation("Signature is required".to_string()));
    }

    let ts = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let ts = lock_timesheet(conn, timesheet_id).await?;
                let ctx = shift_service::load_shift_context(conn, ts.shift_id).await?;
                if !may_approve(actor, role, ctx.company_id) {
                    return Err(forbid_stage(role));
                }

                let status = ts.status()?;
                let updated = match role {
                    ApproverRole::Company => {
                        let next = status.apply(TimesheetEvent::CompanyApproved)?;
                        diesel::update(timesheets::table.find(timesheet_id))
                            .set((
                                timesheets::status.eq(next.as_str()),
                                timesheets::company_approved_by.eq(Some(actor.id)),
                                timesheets::company_approved_at.eq(Some(now)),
                                timesheets::company_signature.eq(Some(signature)),
                                timesheets::write_date.eq(now),
                            ))
                            .returning(Timesheet::as_returning())
                            .get_result(conn)
                            .await?
                    }
                    ApproverRole::Manager => {
                        let next = status.apply(TimesheetEvent::ManagerApproved)?;
                        diesel::update(timesheets::table.find(timesheet_id))
                            .set((
                                timesheets::status.eq(next.as_str()),
                                timesheets::manager_approved_by.eq(Some(actor.id)),
                                timesheets::manager_approved_at.eq(Some(now)),
                                timesheets::manager_signature.eq(Some(signature)),
                                timesheets::write_date.eq(now),
                            ))
                            .returning(Timesheet::as_returning())
                            .get_result(conn)
                            .await?
                    }
                };
                Ok(updated)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::timesheet_status_changed(&ts.status);
    tracing::info!(
        timesheet_id,
        approver_id = actor.id,
        stage = ?role,
        status = %ts.status,
        "Timesheet approved"
    );

    if ts.status()? == TimesheetStatus::Completed
        && document_service::generate_best_effort(conn, renderer, timesheet_id)
            .await
            .is_some()
    {
        return get_timesheet(conn, timesheet_id).await;
    }
    Ok(ts)
}

fn rejection_message(ctx: &ShiftContext, reason: &str) -> String {
    format!(
        "The timesheet for {} on {} was rejected: {}",
        ctx.job_name,
        ctx.shift.date.format("%Y-%m-%d"),
        reason
    )
}

/// Send a pending timesheet back with a reason.
pub async fn reject(
    conn: &mut AsyncPgConnection,
    notifier: &dyn Notifier,
    actor: &CurrentUser,
    timesheet_id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> EngineResult<Timesheet> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation(
            "A rejection reason is required".to_string(),
        ));
    }

    let (ts, ctx, stage) = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let ts = lock_timesheet(conn, timesheet_id).await?;
                let ctx = shift_service::load_shift_context(conn, ts.shift_id).await?;

                let can_review = actor.role.is_manager()
                    || (actor.role == UserRole::CompanyUser
                        && actor.company_id == Some(ctx.company_id));
                if !can_review {
                    return Err(EngineError::Forbidden(
                        "You cannot review this timesheet".to_string(),
                    ));
                }

                let status = ts.status()?;
                let next = status.apply(TimesheetEvent::Rejected)?;
                let stage = stage_of(status).ok_or_else(|| {
                    EngineError::Internal(format!("Timesheet {timesheet_id} has no pending stage"))
                })?;
                if !may_approve(actor, stage, ctx.company_id) {
                    return Err(forbid_stage(stage));
                }

                let updated = diesel::update(timesheets::table.find(timesheet_id))
                    .set((
                        timesheets::status.eq(next.as_str()),
                        timesheets::rejected_by.eq(Some(actor.id)),
                        timesheets::rejected_at.eq(Some(now)),
                        timesheets::rejection_reason.eq(Some(reason)),
                        timesheets::write_date.eq(now),
                    ))
                    .returning(Timesheet::as_returning())
                    .get_result(conn)
                    .await?;
                Ok((updated, ctx, stage))
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::timesheet_status_changed(&ts.status);
    tracing::info!(
        timesheet_id,
        rejected_by = actor.id,
        stage = ?stage,
        "Timesheet rejected"
    );

    let mut recipients = match notification_service::claimed_user_ids(conn, ts.shift_id).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(timesheet_id, "Could not load crew for rejection notice: {e}");
            Vec::new()
        }
    };
    if stage == ApproverRole::Company {
        match notification_service::active_manager_ids(conn).await {
            Ok(ids) => recipients.extend(ids),
            Err(e) => tracing::warn!(timesheet_id, "Could not load managers: {e}"),
        }
    }
    recipients.sort_unstable();
    recipients.dedup();

    let message = rejection_message(&ctx, reason);
    let batch = recipients
        .into_iter()
        .map(|user_id| Notification {
            user_id,
            title: "Timesheet Rejected".to_string(),
            message: message.clone(),
            related_shift_id: Some(ts.shift_id),
            related_timesheet_id: Some(timesheet_id),
        })
        .collect();
    notification_service::fan_out(notifier, batch).await;

    Ok(ts)
}

/// Reopen a completed timesheet for corrections.
pub async fn unlock(
    conn: &mut AsyncPgConnection,
    admin: &CurrentUser,
    timesheet_id: i64,
    reason: &str,
    now: DateTime<Utc>,
) -> EngineResult<Timesheet> {
    permission_service::require_admin(admin, "unlock timesheets")?;
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation(
            "An unlock reason is required".to_string(),
        ));
    }

    let ts = conn
        .transaction::<_, EngineError, _>(|conn| {
            async move {
                let ts = lock_timesheet(conn, timesheet_id).await?;
                let next = ts.status()?.apply(TimesheetEvent::Unlocked)?;

                let line = unlock_audit_line(&admin.name, admin.id, now, reason);
                let notes = append_audit_note(ts.notes.as_deref(), &line);

                document_service::deactivate_documents(conn, timesheet_id).await?;

                let updated = diesel::update(timesheets::table.find(timesheet_id))
                    .set((
                        timesheets::status.eq(next.as_str()),
                        timesheets::company_approved_by.eq(None::<i64>),
                        timesheets::company_approved_at.eq(None::<DateTime<Utc>>),
                        timesheets::company_signature.eq(None::<String>),
                        timesheets::manager_approved_by.eq(None::<i64>),
                        timesheets::manager_approved_at.eq(None::<DateTime<Utc>>),
                        timesheets::manager_signature.eq(None::<String>),
                        timesheets::rejected_by.eq(None::<i64>),
                        timesheets::rejected_at.eq(None::<DateTime<Utc>>),
                        timesheets::rejection_reason.eq(None::<String>),
                        timesheets::document_id.eq(None::<i64>),
                        timesheets::notes.eq(Some(notes)),
                        timesheets::write_date.eq(now),
                    ))
                    .returning(Timesheet::as_returning())
                    .get_result(conn)
                    .await?;
                Ok(updated)
            }
            .scope_boxed()
        })
        .await?;

    crate::metrics::timesheet_status_changed(&ts.status);
    tracing::warn!(
        timesheet_id,
        admin_id = admin.id,
        reason,
        "Timesheet unlocked"
    );
    Ok(ts)
}

/// Latest generated document of a completed timesheet.
pub async fn latest_document(
    conn: &mut AsyncPgConnection,
    timesheet_id: i64,
) -> EngineResult<TimesheetDocument> {
    let ts = get_timesheet(conn, timesheet_id).await?;
    if ts.status()? != TimesheetStatus::Completed {
        return Err(EngineError::InvalidState(format!(
            "Timesheet {timesheet_id} is {}; documents exist only for completed timesheets",
            ts.status
        )));
    }
    document_service::latest_document(conn, timesheet_id)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("No document generated for timesheet {timesheet_id}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole, company_id: Option<i64>) -> CurrentUser {
        CurrentUser {
            id: 9,
            name: "Reviewer".to_string(),
            role,
            company_id,
        }
    }

    #[test]
    fn test_company_stage_approvers() {
        assert!(may_approve(&user(UserRole::CompanyUser, Some(3)), ApproverRole::Company, 3));
        assert!(!may_approve(&user(UserRole::CompanyUser, Some(4)), ApproverRole::Company, 3));
        assert!(may_approve(&user(UserRole::Admin, None), ApproverRole::Company, 3));
        assert!(!may_approve(&user(UserRole::Staff, None), ApproverRole::Company, 3));
        assert!(!may_approve(&user(UserRole::CrewChief, None), ApproverRole::Company, 3));
    }

    #[test]
    fn test_manager_stage_approvers() {
        assert!(may_approve(&user(UserRole::Admin, None), ApproverRole::Manager, 3));
        assert!(may_approve(&user(UserRole::Staff, None), ApproverRole::Manager, 3));
        assert!(!may_approve(&user(UserRole::CompanyUser, Some(3)), ApproverRole::Manager, 3));
    }

    #[test]
    fn test_stage_of_pending_states() {
        assert_eq!(
            stage_of(TimesheetStatus::PendingCompanyApproval),
            Some(ApproverRole::Company)
        );
        assert_eq!(
            stage_of(TimesheetStatus::PendingManagerApproval),
            Some(ApproverRole::Manager)
        );
        assert_eq!(stage_of(TimesheetStatus::Completed), None);
        assert_eq!(stage_of(TimesheetStatus::Rejected), None);
        assert_eq!(stage_of(TimesheetStatus::Draft), None);
    }
}
