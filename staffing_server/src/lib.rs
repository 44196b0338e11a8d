//! Centrix Staffing: shift staffing and timesheet lifecycle engine.
//!
//! Owns how a worker slot on a shift moves from required, to assigned, to
//! clocked in and out, to released back to the pool, and finally into an
//! approved timesheet. Identity, document rendering and notification
//! delivery are external collaborators reached through the traits in
//! `services`.

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod events;
pub mod metrics;
pub mod migration;
pub mod models;
pub mod routes;
pub mod schema;
pub mod services;
