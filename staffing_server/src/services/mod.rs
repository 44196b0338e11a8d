//! Staffing services: the engine's business logic.
//!
//! Every mutating function takes the acting user, consults the permission
//! gate, and runs its read-decide-write inside one database transaction.

pub mod assignment_service;
pub mod conflict_service;
pub mod document_service;
pub mod notification_service;
pub mod permission_service;
pub mod requirement_service;
pub mod shift_service;
pub mod time_service;
pub mod timesheet_service;
