//! Repository layer between the record store and the projection core.
//!
//! # Responsibility
//! - Define the data-access contract the projection core depends on.
//! - Translate store failures into semantic repository errors.
//!
//! # Invariants
//! - Repository APIs return `NotFound` separately from storage transport
//!   errors.

pub mod student_repo;
