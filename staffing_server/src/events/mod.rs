//! Lifecycle events and the transition rules they drive.
//!
//! Assignment and Timesheet statuses only change by applying one of these
//! events; the services persist the resulting status.

pub mod assignment;
pub mod timesheet;
