//! timesheet_documents: rendered output of a completed timesheet.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::timesheet_documents;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = timesheet_documents)]
pub struct TimesheetDocument {
    pub id: i64,
    pub timesheet_id: i64,
    pub content_type: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub size_bytes: i64,
    pub active: bool,
    pub create_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = timesheet_documents)]
pub struct NewTimesheetDocument {
    pub timesheet_id: i64,
    pub content_type: String,
    pub content: Vec<u8>,
    pub size_bytes: i64,
}
