//! SQLite-backed student record store.
//!
//! # Responsibility
//! - Own the single roster connection and run row-level mutations on it.
//! - Publish a full, ordered snapshot of the table after every successful
//!   mutation.
//!
//! # Invariants
//! - Snapshot revisions strictly increase in publication order.
//! - Snapshots list rows by `id ASC`, which is arrival order because ids come
//!   from `AUTOINCREMENT` and are never reused.
//! - A failed snapshot re-read never closes the feed.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::student::{StudentDraft, StudentId, StudentRecord};
use crate::reactive::{Feed, Subscription};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const STUDENT_SELECT_SQL: &str = "SELECT id, name, course FROM students ORDER BY id ASC;";
const SNAPSHOT_READ_ATTEMPTS: u32 = 3;
const SNAPSHOT_RETRY_BACKOFF: Duration = Duration::from_millis(15);

pub type StoreResult<T> = Result<T, StoreError>;

/// Record-store error for bootstrap, mutation and read-back failures.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    NotFound(StudentId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted student data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it with open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Full point-in-time copy of the `students` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSnapshot {
    revision: u64,
    records: Arc<[StudentRecord]>,
}

impl StudentSnapshot {
    pub fn new(revision: u64, records: Vec<StudentRecord>) -> Self {
        Self {
            revision,
            records: records.into(),
        }
    }

    /// Position of this snapshot in the store's publication order.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    /// Shared handle to the rows, for consumers that keep the snapshot.
    pub fn shared_records(&self) -> Arc<[StudentRecord]> {
        Arc::clone(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

struct StoreState {
    conn: Connection,
    revision: u64,
}

/// Durable student table with a live snapshot subscription.
///
/// The store takes ownership of one migrated connection. All statements and
/// snapshot publication run under the same lock, so snapshots leave the
/// store in the order their mutations committed.
pub struct StudentStore {
    state: Mutex<StoreState>,
    feed: Feed<StudentSnapshot>,
}

impl StudentStore {
    /// Wraps a connection prepared by [`crate::db::open_db`].
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    /// - `MissingRequiredTable` when the `students` table is absent.
    pub fn open(conn: Connection) -> StoreResult<Self> {
        ensure_connection_ready(&conn)?;
        let records = read_all(&conn)?;
        info!(
            "event=store_open module=store status=ok records={}",
            records.len()
        );

        Ok(Self {
            state: Mutex::new(StoreState { conn, revision: 0 }),
            feed: Feed::new(StudentSnapshot::new(0, records)),
        })
    }

    /// Subscribes to full-table snapshots, starting with the current one.
    pub fn subscribe_all(&self) -> Subscription<StudentSnapshot> {
        self.feed.subscribe()
    }

    /// Returns the most recently published snapshot.
    pub fn snapshot(&self) -> StudentSnapshot {
        self.feed.latest()
    }

    /// Reads all rows directly, ordered by arrival.
    pub fn list_all(&self) -> StoreResult<Vec<StudentRecord>> {
        let state = self.lock();
        read_all(&state.conn)
    }

    /// Inserts one row and returns the store-assigned id.
    pub fn insert(&self, draft: &StudentDraft) -> StoreResult<StudentId> {
        let started_at = Instant::now();
        let mut state = self.lock();
        state.conn.execute(
            "INSERT INTO students (name, course) VALUES (?1, ?2);",
            params![draft.name(), draft.course()],
        )?;
        let id = state.conn.last_insert_rowid();
        info!(
            "event=student_insert module=store status=ok id={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );

        self.publish_locked(&mut state);
        Ok(id)
    }

    /// Replaces `name` and `course` of the row addressed by `id`.
    pub fn update(&self, id: StudentId, draft: &StudentDraft) -> StoreResult<()> {
        let started_at = Instant::now();
        let mut state = self.lock();
        let changed = state.conn.execute(
            "UPDATE students
             SET
                name = ?1,
                course = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?3;",
            params![draft.name(), draft.course(), id],
        )?;

        if changed == 0 {
            warn!("event=student_update module=store status=error error_code=not_found id={id}");
            return Err(StoreError::NotFound(id));
        }
        info!(
            "event=student_update module=store status=ok id={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );

        self.publish_locked(&mut state);
        Ok(())
    }

    /// Hard-deletes the row addressed by `id`.
    pub fn delete(&self, id: StudentId) -> StoreResult<()> {
        let started_at = Instant::now();
        let mut state = self.lock();
        let changed = state
            .conn
            .execute("DELETE FROM students WHERE id = ?1;", [id])?;

        if changed == 0 {
            warn!("event=student_delete module=store status=error error_code=not_found id={id}");
            return Err(StoreError::NotFound(id));
        }
        info!(
            "event=student_delete module=store status=ok id={} duration_ms={}",
            id,
            started_at.elapsed().as_millis()
        );

        self.publish_locked(&mut state);
        Ok(())
    }

    /// Ends every snapshot subscription. Mutations keep working.
    pub fn close(&self) {
        self.feed.close();
        info!("event=store_close module=store status=ok");
    }

    fn publish_locked(&self, state: &mut StoreState) {
        let mut attempt = 1;
        let records = loop {
            match read_all(&state.conn) {
                Ok(records) => break records,
                Err(err) if attempt < SNAPSHOT_READ_ATTEMPTS => {
                    warn!(
                        "event=store_snapshot module=store status=retry attempt={} error={}",
                        attempt, err
                    );
                    std::thread::sleep(SNAPSHOT_RETRY_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "event=store_snapshot module=store status=error attempts={} error_code=snapshot_read_failed error={}",
                        attempt, err
                    );
                    return;
                }
            }
        };

        state.revision += 1;
        let count = records.len();
        let delivered = self
            .feed
            .publish(StudentSnapshot::new(state.revision, records));
        debug!(
            "event=store_snapshot module=store status=ok revision={} records={} observers={}",
            state.revision, count, delivered
        );
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'students'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(StoreError::MissingRequiredTable("students"));
    }

    Ok(())
}

fn read_all(conn: &Connection) -> StoreResult<Vec<StudentRecord>> {
    let mut stmt = conn.prepare_cached(STUDENT_SELECT_SQL)?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();

    while let Some(row) = rows.next()? {
        records.push(parse_student_row(row)?);
    }

    Ok(records)
}

fn parse_student_row(row: &Row<'_>) -> StoreResult<StudentRecord> {
    let record = StudentRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        course: row.get("course")?,
    };
    record.validate().map_err(|err| {
        StoreError::InvalidData(format!("students.id={} {}", record.id, err))
    })?;
    Ok(record)
}
