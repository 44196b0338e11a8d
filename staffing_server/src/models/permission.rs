//! crew_chief_permissions: delegated management grants.

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::crew_chief_permissions;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Shift,
    Job,
    Client,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Shift => "shift",
            ScopeType::Job => "job",
            ScopeType::Client => "client",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shift" => Some(ScopeType::Shift),
            "job" => Some(ScopeType::Job),
            "client" | "company" => Some(ScopeType::Client),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crew_chief_permissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CrewChiefPermission {
    pub id: i64,
    pub user_id: i64,
    pub scope_type: String,
    pub scope_id: i64,
    pub granted_by: Option<i64>,
    pub create_date: Option<DateTime<Utc>>,
}

impl CrewChiefPermission {
    pub fn scope(&self) -> Option<ScopeType> {
        ScopeType::parse(&self.scope_type)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crew_chief_permissions)]
pub struct NewCrewChiefPermission {
    pub user_id: i64,
    pub scope_type: String,
    pub scope_id: i64,
    pub granted_by: Option<i64>,
}
