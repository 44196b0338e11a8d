//! users: read-only view of the identity system's accounts.

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::users;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Staff,
    CompanyUser,
    CrewChief,
    Employee,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Staff => "staff",
            UserRole::CompanyUser => "company_user",
            UserRole::CrewChief => "crew_chief",
            UserRole::Employee => "employee",
        }
    }

    /// Accepts the canonical spelling as well as the PascalCase names the
    /// identity system has historically emitted.
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "admin" => Some(UserRole::Admin),
            "staff" | "manager" => Some(UserRole::Staff),
            "companyuser" => Some(UserRole::CompanyUser),
            "crewchief" => Some(UserRole::CrewChief),
            "employee" => Some(UserRole::Employee),
            _ => None,
        }
    }

    /// Admins and staff act as managers across every company.
    pub fn is_manager(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Staff)
    }

    /// Roles that can hold a slot on a shift and receive up-for-grabs offers.
    pub fn is_worker(&self) -> bool {
        matches!(self, UserRole::Employee | UserRole::CrewChief)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub company_id: Option<i64>,
    pub active: bool,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

/// The identity the engine works with: who is acting, in which role, and for
/// which company.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub role: UserRole,
    pub company_id: Option<i64>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl TryFrom<UserRow> for CurrentUser {
    type Error = crate::error::EngineError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = UserRole::parse(&row.role).ok_or_else(|| {
            crate::error::EngineError::Internal(format!(
                "User {} has unknown role '{}'",
                row.id, row.role
            ))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            role,
            company_id: row.company_id,
        })
    }
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: String,
    pub company_id: Option<i64>,
    pub active: bool,
}
