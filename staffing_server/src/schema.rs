//! Diesel table definitions for the staffing engine.
//!
//! Tables: companies, users, jobs, shifts, worker_requirements,
//! assigned_personnel, time_entries, timesheets, timesheet_documents,
//! crew_chief_permissions, notifications.

diesel::table! {
    companies (id) {
        id -> Int8,
        name -> Varchar,
        active -> Bool,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    users (id) {
        id -> Int8,
        name -> Varchar,
        email -> Varchar,
        role -> Varchar,
        company_id -> Nullable<Int8>,
        active -> Bool,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    jobs (id) {
        id -> Int8,
        company_id -> Int8,
        name -> Varchar,
        active -> Bool,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    shifts (id) {
        id -> Int8,
        job_id -> Int8,
        date -> Date,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        location -> Nullable<Varchar>,
        status -> Varchar,
        requested_workers -> Nullable<Int4>,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    worker_requirements (id) {
        id -> Int8,
        shift_id -> Int8,
        role_code -> Varchar,
        required_count -> Int4,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    assigned_personnel (id) {
        id -> Int8,
        shift_id -> Int8,
        user_id -> Nullable<Int8>,
        role_code -> Varchar,
        status -> Varchar,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    time_entries (id) {
        id -> Int8,
        assigned_personnel_id -> Int8,
        shift_id -> Int8,
        user_id -> Int8,
        entry_number -> Int4,
        clock_in -> Timestamptz,
        clock_out -> Nullable<Timestamptz>,
        is_active -> Bool,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    timesheets (id) {
        id -> Int8,
        shift_id -> Int8,
        status -> Varchar,
        submitted_by -> Nullable<Int8>,
        submitted_at -> Nullable<Timestamptz>,
        company_approved_by -> Nullable<Int8>,
        company_approved_at -> Nullable<Timestamptz>,
        company_signature -> Nullable<Text>,
        manager_approved_by -> Nullable<Int8>,
        manager_approved_at -> Nullable<Timestamptz>,
        manager_signature -> Nullable<Text>,
        rejected_by -> Nullable<Int8>,
        rejected_at -> Nullable<Timestamptz>,
        rejection_reason -> Nullable<Text>,
        document_id -> Nullable<Int8>,
        notes -> Nullable<Text>,
        create_date -> Nullable<Timestamptz>,
        write_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    timesheet_documents (id) {
        id -> Int8,
        timesheet_id -> Int8,
        content_type -> Varchar,
        content -> Bytea,
        size_bytes -> Int8,
        active -> Bool,
        create_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    crew_chief_permissions (id) {
        id -> Int8,
        user_id -> Int8,
        scope_type -> Varchar,
        scope_id -> Int8,
        granted_by -> Nullable<Int8>,
        create_date -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    notifications (id) {
        id -> Int8,
        user_id -> Int8,
        title -> Varchar,
        message -> Text,
        related_shift_id -> Nullable<Int8>,
        related_timesheet_id -> Nullable<Int8>,
        is_read -> Bool,
        create_date -> Nullable<Timestamptz>,
    }
}

// Foreign key relationships
diesel::joinable!(users -> companies (company_id));
diesel::joinable!(jobs -> companies (company_id));
diesel::joinable!(shifts -> jobs (job_id));
diesel::joinable!(worker_requirements -> shifts (shift_id));
diesel::joinable!(assigned_personnel -> shifts (shift_id));
diesel::joinable!(timesheets -> shifts (shift_id));
diesel::joinable!(timesheet_documents -> timesheets (timesheet_id));
diesel::joinable!(crew_chief_permissions -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    companies,
    users,
    jobs,
    shifts,
    worker_requirements,
    assigned_personnel,
    time_entries,
    timesheets,
    timesheet_documents,
    crew_chief_permissions,
    notifications,
);
