//! Staffing dashboard queries.

pub mod kpi;
