//! worker_requirements: per-role head counts for a shift.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::schema::worker_requirements;

static ROLE_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{0,15}$").unwrap());

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = worker_requirements)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WorkerRequirement {
    pub id: i64,
    pub shift_id: i64,
    pub role_code: String,
    pub required_count: i32,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = worker_requirements)]
pub struct NewWorkerRequirement {
    pub shift_id: i64,
    pub role_code: String,
    pub required_count: i32,
}

/// Fill ratio for a shift.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct FillState {
    pub assigned_count: i64,
    pub required_count: i64,
}

impl FillState {
    /// Per-role rows win; the legacy head-count only applies when there are none.
    pub fn compute(
        assigned_count: i64,
        requirements: &[WorkerRequirement],
        requested_workers: Option<i32>,
    ) -> Self {
        let required_count = if requirements.is_empty() {
            i64::from(requested_workers.unwrap_or(0).max(0))
        } else {
            requirements
                .iter()
                .map(|r| i64::from(r.required_count))
                .sum()
        };
        Self {
            assigned_count,
            required_count,
        }
    }

    pub fn percentage(&self) -> u32 {
        if self.required_count <= 0 {
            return 0;
        }
        ((self.assigned_count * 100) / self.required_count).min(100) as u32
    }
}

pub fn is_valid_role_code(code: &str) -> bool {
    ROLE_CODE_REGEX.is_match(code)
}

/// Display name for a role code; unknown codes render as themselves.
pub fn role_label(code: &str) -> &str {
    match code {
        "CC" => "Crew Chief",
        "SH" => "Stage Hand",
        "FO" => "Fork Operator",
        "RFO" => "Reach Fork Operator",
        "RG" => "Rigger",
        "GL" => "General Labor",
        "SUP" => "Supervisor",
        other => other,
    }
}
