//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose the roster projection to Dart via FRB as one opaque session.
//! - Flatten core results into simple response envelopes for the UI.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Each session owns its store connection; nothing is process-global
//!   except logging.

use log::info;
use roster_core::db::{open_db, open_db_in_memory};
use roster_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    CoreError, CoreResult, MutationHandle, ProjectedView, RosterProjection,
    StoreStudentRepository, StudentId, StudentRecord, StudentStore,
};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir`.
/// - Returns empty string on success and the error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// One student row as rendered by the list screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterItem {
    pub id: i64,
    pub name: String,
    pub course: String,
}

/// Current filtered roster plus the term that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterViewResponse {
    pub items: Vec<RosterItem>,
    pub count: u32,
    pub search_term: String,
}

/// Outcome of an add/edit/delete intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Affected student id; the new id for adds.
    pub student_id: Option<i64>,
    /// `validation|not_found|storage|cancelled|closed|task` on failure.
    pub error_kind: Option<String>,
    /// Offending field (`name|course`) for validation failures.
    pub field: Option<String>,
    /// Human-readable response message for the UI.
    pub message: String,
}

impl RosterActionResponse {
    fn success(message: impl Into<String>, student_id: StudentId) -> Self {
        Self {
            ok: true,
            student_id: Some(student_id),
            error_kind: None,
            field: None,
            message: message.into(),
        }
    }

    fn failure(operation: &str, err: &CoreError) -> Self {
        let (kind, field) = match err {
            CoreError::Validation(validation) => ("validation", Some(validation.field())),
            CoreError::NotFound(_) => ("not_found", None),
            CoreError::Storage(_) => ("storage", None),
            CoreError::Cancelled => ("cancelled", None),
            CoreError::Closed => ("closed", None),
            CoreError::Task(_) => ("task", None),
        };
        Self {
            ok: false,
            student_id: None,
            error_kind: Some(kind.to_string()),
            field: field.map(str::to_string),
            message: format!("{operation} failed: {err}"),
        }
    }
}

/// Opaque roster session held by the Dart side.
///
/// Field order matters: the projection is torn down before the runtime that
/// runs its tasks.
#[flutter_rust_bridge::frb(opaque)]
pub struct RosterSession {
    projection: RosterProjection<StoreStudentRepository>,
    store: Arc<StudentStore>,
    runtime: Runtime,
}

impl RosterSession {
    /// Opens (and migrates) the roster database at `db_path`.
    #[flutter_rust_bridge::frb(sync)]
    pub fn open(db_path: String) -> Result<RosterSession, String> {
        let conn = open_db(db_path.trim()).map_err(|err| format!("roster DB open failed: {err}"))?;
        Self::with_connection(conn)
    }

    /// Opens a throwaway in-memory roster.
    #[flutter_rust_bridge::frb(sync)]
    pub fn open_in_memory() -> Result<RosterSession, String> {
        let conn =
            open_db_in_memory().map_err(|err| format!("roster DB open failed: {err}"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<RosterSession, String> {
        let store = Arc::new(
            StudentStore::open(conn).map_err(|err| format!("roster store init failed: {err}"))?,
        );
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("roster-core")
            .enable_time()
            .build()
            .map_err(|err| format!("roster runtime init failed: {err}"))?;
        let projection = RosterProjection::spawn(
            StoreStudentRepository::new(Arc::clone(&store)),
            runtime.handle(),
        );
        info!("event=session_open module=ffi status=ok");

        Ok(Self {
            projection,
            store,
            runtime,
        })
    }

    /// Current filtered roster.
    #[flutter_rust_bridge::frb(sync)]
    pub fn current_view(&self) -> RosterViewResponse {
        to_view_response(self.projection.current_view(), self.projection.search_term())
    }

    #[flutter_rust_bridge::frb(sync)]
    pub fn search_term(&self) -> String {
        self.projection.search_term()
    }

    /// Replaces the search term; returns the recomputed view.
    #[flutter_rust_bridge::frb(sync)]
    pub fn set_search_term(&self, text: String) -> RosterViewResponse {
        self.projection.set_search_term(text);
        self.current_view()
    }

    #[flutter_rust_bridge::frb(sync)]
    pub fn clear_search_term(&self) -> RosterViewResponse {
        self.projection.clear_search_term();
        self.current_view()
    }

    /// Adds a student. Validation failures carry the offending field.
    pub fn add_student(&self, name: String, course: String) -> RosterActionResponse {
        let result = self
            .projection
            .add_record(name.as_str(), course.as_str())
            .and_then(|handle| self.wait(handle));
        match result {
            Ok(id) => RosterActionResponse::success("Student added.", id),
            Err(err) => RosterActionResponse::failure("add_student", &err),
        }
    }

    pub fn update_student(&self, id: i64, name: String, course: String) -> RosterActionResponse {
        let result = self
            .projection
            .update_record(id, name.as_str(), course.as_str())
            .and_then(|handle| self.wait(handle));
        match result {
            Ok(()) => RosterActionResponse::success("Student updated.", id),
            Err(err) => RosterActionResponse::failure("update_student", &err),
        }
    }

    pub fn delete_student(&self, id: i64) -> RosterActionResponse {
        let result = self
            .projection
            .delete_record(id)
            .and_then(|handle| self.wait(handle));
        match result {
            Ok(()) => RosterActionResponse::success("Student deleted.", id),
            Err(err) => RosterActionResponse::failure("delete_student", &err),
        }
    }

    /// Tears down the projection and ends the store subscription.
    #[flutter_rust_bridge::frb(sync)]
    pub fn close(&self) {
        self.projection.shutdown();
        self.store.close();
    }

    fn wait<T>(&self, handle: MutationHandle<T>) -> CoreResult<T> {
        self.runtime.block_on(handle)
    }
}

fn to_view_response(view: ProjectedView, search_term: String) -> RosterViewResponse {
    RosterViewResponse {
        count: u32::try_from(view.count).unwrap_or(u32::MAX),
        items: view.records.into_iter().map(to_roster_item).collect(),
        search_term,
    }
}

fn to_roster_item(record: StudentRecord) -> RosterItem {
    RosterItem {
        id: record.id,
        name: record.name,
        course: record.course,
    }
}
