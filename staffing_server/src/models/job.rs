//! jobs + companies: the client side of a shift.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{companies, jobs};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub active: bool,
    pub create_date: Option<DateTime<Utc>>,
    pub write_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable, Deserialize)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub company_id: i64,
    pub name: String,
}
