//! Shared fixtures for database-backed tests.
//!
//! Tests run against `DATABASE_URL` inside a transaction that is never
//! committed. They are `#[ignore]`d by default; run them with
//! `cargo test -- --ignored` once `DATABASE_URL` points at PostgreSQL.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};

use staffing_server::models::assignment::AssignedPersonnel;
use staffing_server::models::job::{Company, Job, NewCompany, NewJob};
use staffing_server::models::notification::Notification;
use staffing_server::models::shift::{NewShift, Shift};
use staffing_server::models::user::{CurrentUser, NewUser, UserRole, UserRow};
use staffing_server::schema::{assigned_personnel, companies, jobs, shifts, users};
use staffing_server::services::notification_service::Notifier;

static SEQ: AtomicU64 = AtomicU64::new(1);

const MIGRATION_LOCK: i64 = 0x5374_6166;

/// Open a test connection inside a rolled-back transaction.
pub async fn test_connection() -> AsyncPgConnection {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at PostgreSQL for database tests");

    let mut conn = AsyncPgConnection::establish(&url)
        .await
        .expect("connect to DATABASE_URL");

    // Serialize the migration across concurrently running tests.
    conn.batch_execute(&format!("SELECT pg_advisory_lock({MIGRATION_LOCK})"))
        .await
        .expect("take migration lock");
    staffing_server::migration::run_migration(&mut conn)
        .await
        .expect("run staffing migration");
    conn.batch_execute(&format!("SELECT pg_advisory_unlock({MIGRATION_LOCK})"))
        .await
        .expect("release migration lock");

    conn.begin_test_transaction()
        .await
        .expect("begin test transaction");
    conn
}

fn unique(prefix: &str) -> String {
    let n = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{n}", std::process::id())
}

pub struct Fixture {
    pub company: Company,
    pub job: Job,
}

pub async fn fixture(conn: &mut AsyncPgConnection) -> Fixture {
    let company: Company = diesel::insert_into(companies::table)
        .values(NewCompany {
            name: unique("Harbor Events"),
        })
        .returning(Company::as_returning())
        .get_result(conn)
        .await
        .expect("insert company");

    let job: Job = diesel::insert_into(jobs::table)
        .values(NewJob {
            company_id: company.id,
            name: unique("Summer Expo"),
        })
        .returning(Job::as_returning())
        .get_result(conn)
        .await
        .expect("insert job");

    Fixture { company, job }
}

/// A pending shift of `hours` starting at `start`.
pub async fn shift_at(
    conn: &mut AsyncPgConnection,
    job_id: i64,
    start: DateTime<Utc>,
    hours: i64,
) -> Shift {
    diesel::insert_into(shifts::table)
        .values(NewShift {
            job_id,
            date: start.date_naive(),
            start_time: start,
            end_time: start + Duration::hours(hours),
            location: Some("Pier 48".to_string()),
            status: "pending".to_string(),
            requested_workers: None,
        })
        .returning(Shift::as_returning())
        .get_result(conn)
        .await
        .expect("insert shift")
}

pub async fn user(
    conn: &mut AsyncPgConnection,
    role: UserRole,
    company_id: Option<i64>,
) -> CurrentUser {
    let name = unique(role.as_str());
    let row: UserRow = diesel::insert_into(users::table)
        .values(NewUser {
            email: format!("{name}@example.test"),
            name,
            role: role.as_str().to_string(),
            company_id,
            active: true,
        })
        .returning(UserRow::as_returning())
        .get_result(conn)
        .await
        .expect("insert user");
    CurrentUser::try_from(row).expect("known role")
}

pub async fn admin(conn: &mut AsyncPgConnection) -> CurrentUser {
    user(conn, UserRole::Admin, None).await
}

pub async fn employee(conn: &mut AsyncPgConnection) -> CurrentUser {
    user(conn, UserRole::Employee, None).await
}

pub async fn reload_assignment(conn: &mut AsyncPgConnection, id: i64) -> Option<AssignedPersonnel> {
    assigned_personnel::table
        .find(id)
        .select(AssignedPersonnel::as_select())
        .first(conn)
        .await
        .optional()
        .expect("reload assignment")
}

/// Collects notifications instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn recipients(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|n| n.user_id).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Current time truncated to whole seconds, so it survives a database round trip.
pub fn now_secs() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).expect("valid timestamp")
}
