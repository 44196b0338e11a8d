//! Schema migration for the staffing engine tables.

use diesel_async::AsyncPgConnection;
use diesel_async::SimpleAsyncConnection;

/// SQL migration for staffing tables.
///
/// Idempotent: every statement is `IF NOT EXISTS` or a normalizing `UPDATE`,
/// so it runs on every startup.
pub const MIGRATION_SQL: &str = r#"
-- ================================================================
-- Staffing engine tables
-- ================================================================

CREATE TABLE IF NOT EXISTS companies (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    write_date      TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS users (
    id              BIGSERIAL PRIMARY KEY,
    name            VARCHAR(255) NOT NULL,
    email           VARCHAR(255) NOT NULL UNIQUE,
    role            VARCHAR(32) NOT NULL DEFAULT 'employee',
    company_id      BIGINT REFERENCES companies(id),
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    write_date      TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_users_role ON users (role);

CREATE TABLE IF NOT EXISTS jobs (
    id              BIGSERIAL PRIMARY KEY,
    company_id      BIGINT NOT NULL REFERENCES companies(id),
    name            VARCHAR(255) NOT NULL,
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    write_date      TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS shifts (
    id                  BIGSERIAL PRIMARY KEY,
    job_id              BIGINT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    date                DATE NOT NULL,
    start_time          TIMESTAMPTZ NOT NULL,
    end_time            TIMESTAMPTZ NOT NULL,
    location            VARCHAR(512),
    status              VARCHAR(32) NOT NULL DEFAULT 'pending',
    requested_workers   INTEGER,
    create_date         TIMESTAMPTZ DEFAULT NOW(),
    write_date          TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_shifts_date ON shifts (date);
CREATE INDEX IF NOT EXISTS idx_shifts_job ON shifts (job_id);

CREATE TABLE IF NOT EXISTS worker_requirements (
    id              BIGSERIAL PRIMARY KEY,
    shift_id        BIGINT NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
    role_code       VARCHAR(16) NOT NULL,
    required_count  INTEGER NOT NULL CHECK (required_count >= 0),
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    write_date      TIMESTAMPTZ DEFAULT NOW(),
    UNIQUE (shift_id, role_code)
);

CREATE TABLE IF NOT EXISTS assigned_personnel (
    id              BIGSERIAL PRIMARY KEY,
    shift_id        BIGINT NOT NULL REFERENCES shifts(id) ON DELETE CASCADE,
    user_id         BIGINT REFERENCES users(id),
    role_code       VARCHAR(16) NOT NULL,
    status          VARCHAR(32) NOT NULL DEFAULT 'assigned',
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    write_date      TIMESTAMPTZ DEFAULT NOW(),
    UNIQUE (shift_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_assigned_personnel_user ON assigned_personnel (user_id);
CREATE INDEX IF NOT EXISTS idx_assigned_personnel_status ON assigned_personnel (status);

-- No foreign key on assigned_personnel_id: closed history outlives unassignment.
CREATE TABLE IF NOT EXISTS time_entries (
    id                      BIGSERIAL PRIMARY KEY,
    assigned_personnel_id   BIGINT NOT NULL,
    shift_id                BIGINT NOT NULL,
    user_id                 BIGINT NOT NULL,
    entry_number            INTEGER NOT NULL,
    clock_in                TIMESTAMPTZ NOT NULL,
    clock_out               TIMESTAMPTZ,
    is_active               BOOLEAN NOT NULL DEFAULT TRUE,
    create_date             TIMESTAMPTZ DEFAULT NOW(),
    write_date              TIMESTAMPTZ DEFAULT NOW(),
    UNIQUE (assigned_personnel_id, entry_number)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_time_entries_one_active
    ON time_entries (assigned_personnel_id) WHERE is_active;
CREATE INDEX IF NOT EXISTS idx_time_entries_shift ON time_entries (shift_id);

CREATE TABLE IF NOT EXISTS timesheets (
    id                      BIGSERIAL PRIMARY KEY,
    shift_id                BIGINT NOT NULL UNIQUE REFERENCES shifts(id),
    status                  VARCHAR(32) NOT NULL DEFAULT 'draft',
    submitted_by            BIGINT,
    submitted_at            TIMESTAMPTZ,
    company_approved_by     BIGINT,
    company_approved_at     TIMESTAMPTZ,
    company_signature       TEXT,
    manager_approved_by     BIGINT,
    manager_approved_at     TIMESTAMPTZ,
    manager_signature       TEXT,
    rejected_by             BIGINT,
    rejected_at             TIMESTAMPTZ,
    rejection_reason        TEXT,
    document_id             BIGINT,
    notes                   TEXT,
    create_date             TIMESTAMPTZ DEFAULT NOW(),
    write_date              TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_timesheets_status ON timesheets (status);

CREATE TABLE IF NOT EXISTS timesheet_documents (
    id              BIGSERIAL PRIMARY KEY,
    timesheet_id    BIGINT NOT NULL REFERENCES timesheets(id) ON DELETE CASCADE,
    content_type    VARCHAR(128) NOT NULL,
    content         BYTEA NOT NULL,
    size_bytes      BIGINT NOT NULL,
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    create_date     TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_timesheet_documents_timesheet ON timesheet_documents (timesheet_id);

CREATE TABLE IF NOT EXISTS crew_chief_permissions (
    id              BIGSERIAL PRIMARY KEY,
    user_id         BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    scope_type      VARCHAR(16) NOT NULL,
    scope_id        BIGINT NOT NULL,
    granted_by      BIGINT,
    create_date     TIMESTAMPTZ DEFAULT NOW(),
    UNIQUE (user_id, scope_type, scope_id)
);

CREATE TABLE IF NOT EXISTS notifications (
    id                      BIGSERIAL PRIMARY KEY,
    user_id                 BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title                   VARCHAR(255) NOT NULL,
    message                 TEXT NOT NULL,
    related_shift_id        BIGINT,
    related_timesheet_id    BIGINT,
    is_read                 BOOLEAN NOT NULL DEFAULT FALSE,
    create_date             TIMESTAMPTZ DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, is_read);

-- ================================================================
-- Legacy status spellings
-- ================================================================

UPDATE assigned_personnel SET status = 'shift_ended'
    WHERE status IN ('Shift Ended', 'ShiftEnded', 'shift ended', 'SHIFT_ENDED');
UPDATE assigned_personnel SET status = 'clocked_in'
    WHERE status IN ('Clocked In', 'ClockedIn', 'CLOCKED_IN');
UPDATE assigned_personnel SET status = 'clocked_out'
    WHERE status IN ('Clocked Out', 'ClockedOut', 'CLOCKED_OUT', 'On Break', 'OnBreak');
UPDATE assigned_personnel SET status = 'no_show'
    WHERE status IN ('No Show', 'NoShow', 'NO_SHOW');
UPDATE assigned_personnel SET status = 'up_for_grabs'
    WHERE status IN ('Up For Grabs', 'UpForGrabs', 'UP_FOR_GRABS');
UPDATE assigned_personnel SET status = 'assigned'
    WHERE status IN ('Assigned', 'ASSIGNED');
"#;

/// Run the staffing migration.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL)
        .await
        .map_err(|e| anyhow::anyhow!("Staffing migration failed: {e}"))?;
    Ok(())
}
