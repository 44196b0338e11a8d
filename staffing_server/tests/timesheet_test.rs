//! Timesheet lifecycle against PostgreSQL.

mod common;

use chrono::Duration;

use staffing_server::error::EngineError;
use staffing_server::models::shift::ShiftStatus;
use staffing_server::models::timesheet::{ApproverRole, TimesheetStatus};
use staffing_server::models::user::{CurrentUser, UserRole};
use staffing_server::services::{assignment_service, shift_service, time_service, timesheet_service};

use common::{admin, employee, fixture, now_secs, shift_at, user, Fixture};

struct FinishedShift {
    boss: CurrentUser,
    client: CurrentUser,
    workers: Vec<CurrentUser>,
    shift_id: i64,
    timesheet_id: i64,
}

async fn finished_shift(
    conn: &mut diesel_async::AsyncPgConnection,
    fx: &Fixture,
) -> FinishedShift {
    let boss = admin(conn).await;
    let client = user(conn, UserRole::CompanyUser, Some(fx.company.id)).await;
    let t0 = now_secs() - Duration::hours(9);
    let shift = shift_at(conn, fx.job.id, t0, 8).await;
    let worker = employee(conn).await;
    let row = assignment_service::assign(conn, &boss, shift.id, worker.id, "GL")
        .await
        .unwrap();
    time_service::clock_in(conn, &worker, row.id, t0).await.unwrap();
    time_service::end_shift(conn, &boss, row.id, t0 + Duration::hours(8))
        .await
        .unwrap();
    let outcome = timesheet_service::finalize(conn, &boss, shift.id, t0 + Duration::hours(8))
        .await
        .unwrap();

    FinishedShift {
        boss,
        client,
        workers: vec![worker],
        shift_id: shift.id,
        timesheet_id: outcome.timesheet.id,
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_finalize_requires_every_worker_done() {
    let mut conn = common::test_connection().await;
    let boss = admin(&mut conn).await;
    let fx = fixture(&mut conn).await;
    let t0 = now_secs() - Duration::hours(9);
    let shift = shift_at(&mut conn, fx.job.id, t0, 8).await;
    let done = employee(&mut conn).await;
    let lingering = employee(&mut conn).await;
    let row_done = assignment_service::assign(&mut conn, &boss, shift.id, done.id, "GL")
        .await
        .unwrap();
    let row_lingering = assignment_service::assign(&mut conn, &boss, shift.id, lingering.id, "GL")
        .await
        .unwrap();
    time_service::end_shift(&mut conn, &boss, row_done.id, t0 + Duration::hours(8))
        .await
        .unwrap();

    let err = timesheet_service::finalize(&mut conn, &boss, shift.id, now_secs())
        .await
        .unwrap_err();
    match err {
        EngineError::InvalidState(msg) => assert!(msg.contains("1 worker(s) still active"), "{msg}"),
        other => panic!("expected InvalidState, got {other:?}"),
    }

    time_service::end_shift(&mut conn, &boss, row_lingering.id, t0 + Duration::hours(8))
        .await
        .unwrap();
    let first = timesheet_service::finalize(&mut conn, &boss, shift.id, now_secs())
        .await
        .unwrap();
    assert!(first.created);
    assert_eq!(
        first.timesheet.status().unwrap(),
        TimesheetStatus::PendingCompanyApproval
    );
    assert_eq!(first.timesheet.submitted_by, Some(boss.id));

    let reloaded = shift_service::load_shift(&mut conn, shift.id).await.unwrap();
    assert_eq!(ShiftStatus::parse(&reloaded.status), Some(ShiftStatus::Completed));

    let second = timesheet_service::finalize(&mut conn, &boss, shift.id, now_secs())
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.timesheet.id, first.timesheet.id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_approval_chain_and_unlock() {
    let mut conn = common::test_connection().await;
    let fx = fixture(&mut conn).await;
    let done = finished_shift(&mut conn, &fx).await;
    let now = now_secs();

    // Manager stage is not open yet.
    let err = timesheet_service::approve(
        &mut conn,
        None,
        &done.boss,
        done.timesheet_id,
        ApproverRole::Manager,
        "D. Ortiz",
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "{err:?}");

    let err = timesheet_service::approve(
        &mut conn,
        None,
        &done.client,
        done.timesheet_id,
        ApproverRole::Company,
        "   ",
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)), "{err:?}");

    let ts = timesheet_service::approve(
        &mut conn,
        None,
        &done.client,
        done.timesheet_id,
        ApproverRole::Company,
        "Client Signer",
        now,
    )
    .await
    .unwrap();
    assert_eq!(ts.status().unwrap(), TimesheetStatus::PendingManagerApproval);
    assert_eq!(ts.company_approved_by, Some(done.client.id));

    let ts = timesheet_service::approve(
        &mut conn,
        None,
        &done.boss,
        done.timesheet_id,
        ApproverRole::Manager,
        "D. Ortiz",
        now,
    )
    .await
    .unwrap();
    assert_eq!(ts.status().unwrap(), TimesheetStatus::Completed);

    let notifier = common::RecordingNotifier::default();
    let err = timesheet_service::reject(
        &mut conn,
        &notifier,
        &done.boss,
        done.timesheet_id,
        "too late",
        now,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "{err:?}");

    let err = timesheet_service::unlock(&mut conn, &done.client, done.timesheet_id, "typo", now)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)), "{err:?}");

    let ts = timesheet_service::unlock(
        &mut conn,
        &done.boss,
        done.timesheet_id,
        "wrong hours",
        now,
    )
    .await
    .unwrap();
    assert_eq!(ts.status().unwrap(), TimesheetStatus::Draft);
    assert!(ts.company_approved_by.is_none());
    assert!(ts.company_signature.is_none());
    assert!(ts.manager_approved_by.is_none());
    assert!(ts.manager_signature.is_none());
    assert!(ts.document_id.is_none());
    let notes = ts.notes.unwrap();
    assert!(notes.contains(&done.boss.name));
    assert!(notes.contains(&format!("(user {})", done.boss.id)));
    assert!(notes.contains("wrong hours"));

    let ts = timesheet_service::submit(&mut conn, &done.boss, done.timesheet_id, now)
        .await
        .unwrap();
    assert_eq!(ts.status().unwrap(), TimesheetStatus::PendingCompanyApproval);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_company_rejection_notifies_crew_and_managers() {
    let mut conn = common::test_connection().await;
    let fx = fixture(&mut conn).await;
    let done = finished_shift(&mut conn, &fx).await;
    let staff = user(&mut conn, UserRole::Staff, None).await;
    let notifier = common::RecordingNotifier::default();

    // Staff cannot act at the company stage.
    let err = timesheet_service::reject(
        &mut conn,
        &notifier,
        &staff,
        done.timesheet_id,
        "hours look off",
        now_secs(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)), "{err:?}");

    let ts = timesheet_service::reject(
        &mut conn,
        &notifier,
        &done.client,
        done.timesheet_id,
        "hours look off",
        now_secs(),
    )
    .await
    .unwrap();
    assert_eq!(ts.status().unwrap(), TimesheetStatus::Rejected);
    assert_eq!(ts.rejected_by, Some(done.client.id));
    assert_eq!(ts.rejection_reason.as_deref(), Some("hours look off"));

    let recipients = notifier.recipients();
    assert!(recipients.contains(&done.workers[0].id));
    assert!(recipients.contains(&done.boss.id));
    assert!(recipients.contains(&staff.id));
    assert!(!recipients.contains(&done.client.id));

    let resubmitted = timesheet_service::submit(&mut conn, &done.boss, done.timesheet_id, now_secs())
        .await
        .unwrap();
    assert_eq!(
        resubmitted.status().unwrap(),
        TimesheetStatus::PendingCompanyApproval
    );
    assert_eq!(
        timesheet_service::get_for_shift(&mut conn, done.shift_id)
            .await
            .unwrap()
            .map(|t| t.id),
        Some(done.timesheet_id)
    );
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_finalized_shift_takes_no_new_work() {
    let mut conn = common::test_connection().await;
    let boss = admin(&mut conn).await;
    let fx = fixture(&mut conn).await;
    let now = now_secs();
    let shift = shift_at(&mut conn, fx.job.id, now + Duration::hours(3), 8).await;
    let dropper = employee(&mut conn).await;
    let late = employee(&mut conn).await;

    // A released slot has no worker, so it does not hold up finalize.
    let row = assignment_service::assign(&mut conn, &boss, shift.id, dropper.id, "GL")
        .await
        .unwrap();
    let notifier = common::RecordingNotifier::default();
    assignment_service::drop_assignment(&mut conn, &notifier, None, row.id, &dropper, now)
        .await
        .unwrap();
    let first = timesheet_service::finalize(&mut conn, &boss, shift.id, now)
        .await
        .unwrap();
    assert!(first.created);

    let err = assignment_service::assign(&mut conn, &boss, shift.id, late.id, "GL")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "{err:?}");

    let err = assignment_service::claim(&mut conn, &late, shift.id, row.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "{err:?}");

    let again = timesheet_service::finalize(&mut conn, &boss, shift.id, now)
        .await
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.timesheet.id, first.timesheet.id);
    let slots = assignment_service::list_for_shift(&mut conn, shift.id).await.unwrap();
    assert!(slots.iter().all(|s| s.user_id.is_none()));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_cancelled_shift_rejects_clock_in() {
    let mut conn = common::test_connection().await;
    let boss = admin(&mut conn).await;
    let fx = fixture(&mut conn).await;
    let start = now_secs() - Duration::hours(1);
    let shift = shift_at(&mut conn, fx.job.id, start, 8).await;
    let worker = employee(&mut conn).await;
    let other = employee(&mut conn).await;
    let row = assignment_service::assign(&mut conn, &boss, shift.id, worker.id, "GL")
        .await
        .unwrap();

    shift_service::update_status(&mut conn, shift.id, ShiftStatus::Cancelled)
        .await
        .unwrap();

    let err = time_service::clock_in(&mut conn, &worker, row.id, now_secs())
        .await
        .unwrap_err();
    match err {
        EngineError::InvalidState(msg) => assert!(msg.contains("cancelled"), "{msg}"),
        other => panic!("expected InvalidState, got {other:?}"),
    }
    let err = assignment_service::assign(&mut conn, &boss, shift.id, other.id, "GL")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)), "{err:?}");
    assert!(time_service::list_entries(&mut conn, row.id).await.unwrap().is_empty());
}
