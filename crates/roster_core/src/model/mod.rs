//! Student roster domain model.
//!
//! # Responsibility
//! - Define canonical data structures used by store, repository and
//!   projection layers.
//!
//! # Invariants
//! - Every persisted record is identified by a store-assigned `StudentId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod student;
