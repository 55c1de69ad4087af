//! Tracked, cancellable store mutations.

use super::roster::{CoreError, CoreResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::task::{AbortHandle, JoinHandle};

/// Completion of one mutation handed off by the projection core.
///
/// Awaiting resolves to the repository outcome. Dropping the handle does not
/// cancel the work; the owning projection still aborts it on shutdown.
#[derive(Debug)]
pub struct MutationHandle<T> {
    join: JoinHandle<CoreResult<T>>,
}

impl<T> MutationHandle<T> {
    pub(crate) fn new(join: JoinHandle<CoreResult<T>>) -> Self {
        Self { join }
    }

    /// Aborts the mutation if it has not completed yet.
    pub fn cancel(&self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl<T> Future for MutationHandle<T> {
    type Output = CoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.join).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_cancelled() => Poll::Ready(Err(CoreError::Cancelled)),
            Poll::Ready(Err(err)) => Poll::Ready(Err(CoreError::Task(err.to_string()))),
        }
    }
}

/// In-flight mutation tasks owned by one projection.
#[derive(Default)]
pub(crate) struct TaskRegistry {
    handles: Mutex<Vec<AbortHandle>>,
}

impl TaskRegistry {
    pub(crate) fn track(&self, handle: AbortHandle) {
        let mut handles = self.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    /// Aborts every tracked task and returns how many were still running.
    pub(crate) fn abort_all(&self) -> usize {
        let mut handles = self.lock();
        let running = handles.iter().filter(|handle| !handle.is_finished()).count();
        for handle in handles.drain(..) {
            handle.abort();
        }
        running
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AbortHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
