//! Student repository contract and store-backed implementation.
//!
//! # Responsibility
//! - Provide the live collection subscription and row mutations to the
//!   projection core.
//! - Keep store details (connection, SQL) behind a trait seam.
//!
//! # Invariants
//! - Writes only accept validated [`StudentDraft`] values.
//! - The pass-through adds no caching or reordering of snapshots.

use crate::model::student::{StudentDraft, StudentId, StudentRecord};
use crate::reactive::Subscription;
use crate::store::student_store::{StoreError, StudentSnapshot, StudentStore};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for student persistence operations.
#[derive(Debug)]
pub enum RepoError {
    /// Update or delete addressed an id that no longer exists.
    NotFound(StudentId),
    /// Any lower-level store failure.
    Storage(StoreError),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "student not found: {id}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

/// Repository interface consumed by the projection core.
///
/// Mutations are blocking calls; the projection core runs them off the
/// caller's task.
pub trait StudentRepository: Send + Sync + 'static {
    /// Live, replay-latest stream of full-table snapshots.
    fn subscribe_all(&self) -> Subscription<StudentSnapshot>;
    fn list_all(&self) -> RepoResult<Vec<StudentRecord>>;
    fn insert(&self, draft: &StudentDraft) -> RepoResult<StudentId>;
    fn update(&self, id: StudentId, draft: &StudentDraft) -> RepoResult<()>;
    fn delete(&self, id: StudentId) -> RepoResult<()>;
}

impl<T: StudentRepository + ?Sized> StudentRepository for Arc<T> {
    fn subscribe_all(&self) -> Subscription<StudentSnapshot> {
        (**self).subscribe_all()
    }

    fn list_all(&self) -> RepoResult<Vec<StudentRecord>> {
        (**self).list_all()
    }

    fn insert(&self, draft: &StudentDraft) -> RepoResult<StudentId> {
        (**self).insert(draft)
    }

    fn update(&self, id: StudentId, draft: &StudentDraft) -> RepoResult<()> {
        (**self).update(id, draft)
    }

    fn delete(&self, id: StudentId) -> RepoResult<()> {
        (**self).delete(id)
    }
}

/// Pass-through repository over an explicitly owned [`StudentStore`].
#[derive(Clone)]
pub struct StoreStudentRepository {
    store: Arc<StudentStore>,
}

impl StoreStudentRepository {
    pub fn new(store: Arc<StudentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<StudentStore> {
        &self.store
    }
}

impl StudentRepository for StoreStudentRepository {
    fn subscribe_all(&self) -> Subscription<StudentSnapshot> {
        self.store.subscribe_all()
    }

    fn list_all(&self) -> RepoResult<Vec<StudentRecord>> {
        Ok(self.store.list_all()?)
    }

    fn insert(&self, draft: &StudentDraft) -> RepoResult<StudentId> {
        Ok(self.store.insert(draft)?)
    }

    fn update(&self, id: StudentId, draft: &StudentDraft) -> RepoResult<()> {
        Ok(self.store.update(id, draft)?)
    }

    fn delete(&self, id: StudentId) -> RepoResult<()> {
        Ok(self.store.delete(id)?)
    }
}
