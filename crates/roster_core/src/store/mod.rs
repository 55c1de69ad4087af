//! Durable record store for student rows.
//!
//! # Responsibility
//! - Execute insert/update/delete against SQLite.
//! - Expose the live, replay-latest snapshot subscription consumed by the
//!   repository layer.

pub mod student_store;
