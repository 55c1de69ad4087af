//! Core domain logic for the student roster.
//! This crate owns the record store, the repository seam and the reactive
//! search projection consumed by UI layers.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod projection;
pub mod reactive;
pub mod repo;
pub mod store;

pub use config::RosterConfig;
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::student::{StudentDraft, StudentId, StudentRecord, StudentValidationError};
pub use projection::filter::{project, ProjectedView};
pub use projection::mutation::MutationHandle;
pub use projection::roster::{CoreError, CoreResult, RosterProjection};
pub use reactive::{Feed, Subscription};
pub use repo::student_repo::{RepoError, RepoResult, StoreStudentRepository, StudentRepository};
pub use store::student_store::{StoreError, StoreResult, StudentSnapshot, StudentStore};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
