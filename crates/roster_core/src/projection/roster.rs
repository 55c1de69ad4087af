//! Reactive roster projection core.
//!
//! # Responsibility
//! - Mirror the repository's live collection and combine it with the search
//!   term into a published [`ProjectedView`].
//! - Validate and hand off add/update/delete intents to the repository.
//!
//! # Invariants
//! - The published view is always `project(full_collection, search_term)`.
//! - Every applied input transition publishes exactly one view; snapshots are
//!   applied in revision order and stale revisions are dropped unpublished.
//! - Mutations never touch `full_collection` directly; changes arrive through
//!   the subscription.
//! - After shutdown no task owned by the projection keeps running and no new
//!   store write starts.

use super::filter::{project, ProjectedView};
use super::mutation::{MutationHandle, TaskRegistry};
use crate::model::student::{StudentDraft, StudentId, StudentRecord, StudentValidationError};
use crate::reactive::{Feed, Subscription};
use crate::repo::student_repo::{RepoError, RepoResult, StudentRepository};
use crate::store::student_store::{StoreError, StudentSnapshot};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type CoreResult<T> = Result<T, CoreError>;

/// Error surfaced by projection entry points.
#[derive(Debug)]
pub enum CoreError {
    /// Input rejected before any store call.
    Validation(StudentValidationError),
    /// Target record no longer exists.
    NotFound(StudentId),
    /// Store failure relayed unchanged.
    Storage(StoreError),
    /// The mutation was aborted by shutdown or by its handle.
    Cancelled,
    /// The projection was already shut down.
    Closed,
    /// The mutation task failed without producing a result.
    Task(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::Storage(err) => write!(f, "storage failure: {err}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Closed => write!(f, "roster projection is shut down"),
            Self::Task(message) => write!(f, "mutation task failed: {message}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StudentValidationError> for CoreError {
    fn from(value: StudentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Storage(err) => Self::Storage(err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Snapshot,
    SearchTerm,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::SearchTerm => "search_term",
        }
    }
}

/// Input slots of the projection plus the last applied snapshot revision.
struct ProjectionState {
    full_collection: Arc<[StudentRecord]>,
    search_term: String,
    applied_revision: Option<u64>,
    closed: bool,
}

/// Inputs and outputs shared between the owner and the ingest task.
struct Shared {
    state: Mutex<ProjectionState>,
    view_feed: Feed<ProjectedView>,
    term_feed: Feed<String>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ProjectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies one snapshot. Returns `false` when it was stale or the
    /// projection is closed.
    fn apply_snapshot(&self, snapshot: StudentSnapshot) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        if let Some(applied) = state.applied_revision {
            if snapshot.revision() <= applied {
                debug!(
                    "event=projection_snapshot module=projection status=skipped revision={} applied_revision={}",
                    snapshot.revision(),
                    applied
                );
                return false;
            }
        }

        state.applied_revision = Some(snapshot.revision());
        state.full_collection = snapshot.shared_records();
        self.recompute_locked(&state, Trigger::Snapshot);
        true
    }

    fn recompute_locked(&self, state: &ProjectionState, trigger: Trigger) {
        let view = project(&state.full_collection, &state.search_term);
        debug!(
            "event=projection_recompute module=projection status=ok trigger={} term_len={} total={} visible={}",
            trigger.as_str(),
            state.search_term.chars().count(),
            state.full_collection.len(),
            view.count
        );
        self.view_feed.publish(view);
    }
}

/// Reactive projection over a [`StudentRepository`].
///
/// Holds the latest collection snapshot and the search term, republishes the
/// filtered view whenever either changes, and forwards mutations to the
/// repository on the runtime's blocking pool.
pub struct RosterProjection<R: StudentRepository> {
    repo: Arc<R>,
    shared: Arc<Shared>,
    runtime: Handle,
    tasks: Arc<TaskRegistry>,
    ingest: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl<R: StudentRepository> RosterProjection<R> {
    /// Subscribes to `repo` and starts the ingest task on `runtime`.
    ///
    /// The snapshot replayed by the subscription is applied before this
    /// returns, so the first observed view already reflects the store.
    pub fn spawn(repo: R, runtime: &Handle) -> Self {
        let repo = Arc::new(repo);
        let mut subscription = repo.subscribe_all();

        let shared = Arc::new(Shared {
            state: Mutex::new(ProjectionState {
                full_collection: Arc::from(Vec::new()),
                search_term: String::new(),
                applied_revision: None,
                closed: false,
            }),
            view_feed: Feed::new(ProjectedView::default()),
            term_feed: Feed::new(String::new()),
        });

        if let Some(initial) = subscription.try_next() {
            shared.apply_snapshot(initial);
        }

        let ingest_shared = Arc::clone(&shared);
        let ingest = runtime.spawn(ingest_loop(subscription, ingest_shared));
        info!(
            "event=projection_start module=projection status=ok records={}",
            shared.view_feed.latest().count
        );

        Self {
            repo,
            shared,
            runtime: runtime.clone(),
            tasks: Arc::new(TaskRegistry::default()),
            ingest: Mutex::new(Some(ingest)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replay-latest stream of projected views.
    pub fn observe_projected_view(&self) -> Subscription<ProjectedView> {
        self.shared.view_feed.subscribe()
    }

    /// Replay-latest stream of the search term.
    pub fn observe_search_term(&self) -> Subscription<String> {
        self.shared.term_feed.subscribe()
    }

    /// Most recently published view.
    pub fn current_view(&self) -> ProjectedView {
        self.shared.view_feed.latest()
    }

    pub fn search_term(&self) -> String {
        self.shared.lock().search_term.clone()
    }

    /// Replaces the search term and republishes the view.
    ///
    /// Setting the current value again is not a transition and publishes
    /// nothing. Returns whether a new view was published.
    pub fn set_search_term(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        let mut state = self.shared.lock();
        if state.closed || state.search_term == text {
            return false;
        }

        state.search_term = text;
        self.shared.term_feed.publish(state.search_term.clone());
        self.shared.recompute_locked(&state, Trigger::SearchTerm);
        true
    }

    /// Same as `set_search_term("")`.
    pub fn clear_search_term(&self) -> bool {
        self.set_search_term(String::new())
    }

    /// Validates and inserts a new record.
    ///
    /// # Errors
    /// - Returns `Validation` synchronously when a field trims to empty; the
    ///   repository is not called.
    /// - Returns `Closed` after shutdown.
    /// - The handle resolves to the store-assigned id or the relayed
    ///   repository error.
    pub fn add_record(&self, name: &str, course: &str) -> CoreResult<MutationHandle<StudentId>> {
        let draft = StudentDraft::new(name, course)?;
        self.hand_off("student_add", None, move |repo| repo.insert(&draft))
    }

    /// Validates and replaces `name`/`course` of record `id`.
    ///
    /// The stale row stays visible until the store publishes the next
    /// snapshot. Resolves to `NotFound` when `id` no longer exists.
    pub fn update_record(
        &self,
        id: StudentId,
        name: &str,
        course: &str,
    ) -> CoreResult<MutationHandle<()>> {
        let draft = StudentDraft::new(name, course)?;
        self.hand_off("student_update", Some(id), move |repo| {
            repo.update(id, &draft)
        })
    }

    /// Deletes record `id`. Resolves to `NotFound` when it is already absent.
    pub fn delete_record(&self, id: StudentId) -> CoreResult<MutationHandle<()>> {
        self.hand_off("student_delete", Some(id), move |repo| repo.delete(id))
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tears the projection down.
    ///
    /// Stops snapshot ingestion, aborts in-flight mutations and ends every
    /// view and search-term stream. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shared.lock().closed = true;
        let ingest = self
            .ingest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ingest) = ingest {
            ingest.abort();
        }
        let aborted = self.tasks.abort_all();
        self.shared.view_feed.close();
        self.shared.term_feed.close();

        info!("event=projection_shutdown module=projection status=ok aborted_mutations={aborted}");
    }

    fn hand_off<T, F>(
        &self,
        event: &'static str,
        id: Option<StudentId>,
        op: F,
    ) -> CoreResult<MutationHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> RepoResult<T> + Send + 'static,
    {
        if self.is_shut_down() {
            return Err(CoreError::Closed);
        }

        let repo = Arc::clone(&self.repo);
        let closed = Arc::clone(&self.closed);
        let join = self.runtime.spawn(async move {
            let started_at = Instant::now();
            let outcome = tokio::task::spawn_blocking(move || {
                if closed.load(Ordering::Acquire) {
                    return Err(CoreError::Cancelled);
                }
                op(repo.as_ref()).map_err(CoreError::from)
            })
            .await;

            let result = match outcome {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(CoreError::Cancelled),
                Err(err) => Err(CoreError::Task(err.to_string())),
            };
            log_mutation(event, id, &result, started_at);
            result
        });

        self.tasks.track(join.abort_handle());
        Ok(MutationHandle::new(join))
    }
}

impl<R: StudentRepository> Drop for RosterProjection<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn ingest_loop(mut subscription: Subscription<StudentSnapshot>, shared: Arc<Shared>) {
    while let Some(snapshot) = subscription.next().await {
        shared.apply_snapshot(snapshot);
    }
    debug!("event=projection_ingest module=projection status=ended");
}

fn log_mutation<T>(
    event: &str,
    id: Option<StudentId>,
    result: &CoreResult<T>,
    started_at: Instant,
) {
    let id = id.map_or_else(|| "-".to_string(), |id| id.to_string());
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(_) => info!("event={event} module=projection status=ok id={id} duration_ms={duration_ms}"),
        Err(CoreError::NotFound(_)) => warn!(
            "event={event} module=projection status=error id={id} duration_ms={duration_ms} error_code=not_found"
        ),
        Err(CoreError::Cancelled) => info!(
            "event={event} module=projection status=cancelled id={id} duration_ms={duration_ms}"
        ),
        Err(err) => warn!(
            "event={event} module=projection status=error id={id} duration_ms={duration_ms} error_code=storage error={err}"
        ),
    }
}
