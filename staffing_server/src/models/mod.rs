//! Staffing data models.

pub mod assignment;
pub mod document;
pub mod job;
pub mod notification;
pub mod permission;
pub mod requirement;
pub mod shift;
pub mod time_entry;
pub mod timesheet;
pub mod user;
