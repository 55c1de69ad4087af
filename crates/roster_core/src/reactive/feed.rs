//! Replay-latest, multi-observer value feed.
//!
//! # Responsibility
//! - Hold the most recently published value and hand it to new observers.
//! - Deliver every later publication to every live observer in order.
//!
//! # Invariants
//! - Publish and subscribe are serialized by one lock, so an observer never
//!   misses or duplicates a value published after it subscribed.
//! - A closed feed never publishes again; its subscriptions end once their
//!   buffered values are consumed.

use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

struct FeedState<T> {
    latest: T,
    observers: Vec<mpsc::UnboundedSender<T>>,
    closed: bool,
}

/// Shared publisher handle. Clones publish into the same feed.
pub struct Feed<T> {
    inner: Arc<Mutex<FeedState<T>>>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Feed<T> {
    /// Creates a feed whose replayed value is `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedState {
                latest: initial,
                observers: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Publishes `value` to every live observer and stores it for replay.
    ///
    /// Returns the number of observers that received the value. Publishing
    /// into a closed feed is a no-op returning `0`.
    pub fn publish(&self, value: T) -> usize {
        let mut state = self.lock();
        if state.closed {
            return 0;
        }
        state
            .observers
            .retain(|observer| observer.send(value.clone()).is_ok());
        state.latest = value;
        state.observers.len()
    }

    /// Registers a new observer that first yields the current value.
    ///
    /// Subscribing to a closed feed yields the final value, then ends.
    pub fn subscribe(&self) -> Subscription<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.lock();
        // The receiver is alive, so seeding cannot fail.
        let _ = sender.send(state.latest.clone());
        if !state.closed {
            state.observers.push(sender);
        }
        Subscription { receiver }
    }

    /// Returns a clone of the replayed value.
    pub fn latest(&self) -> T {
        self.lock().latest.clone()
    }

    /// Stops publication and ends every subscription.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.observers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of observers still attached, after pruning dropped ones.
    pub fn observer_count(&self) -> usize {
        let mut state = self.lock();
        state.observers.retain(|observer| !observer.is_closed());
        state.observers.len()
    }

    fn lock(&self) -> MutexGuard<'_, FeedState<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Observer side of a [`Feed`].
///
/// Usable directly through [`Subscription::next`] or as a
/// [`futures::Stream`].
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Waits for the next value. `None` once the feed is closed or dropped.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns an already-delivered value without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::Feed;
    use futures::StreamExt;

    #[test]
    fn new_observer_receives_latest_value_first() {
        let feed = Feed::new(1);
        feed.publish(2);

        let mut subscription = feed.subscribe();
        assert_eq!(subscription.try_next(), Some(2));
        assert_eq!(subscription.try_next(), None);
    }

    #[test]
    fn every_observer_sees_every_publication_in_order() {
        let feed = Feed::new(0);
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();

        assert_eq!(feed.publish(1), 2);
        assert_eq!(feed.publish(2), 2);

        for subscription in [&mut first, &mut second] {
            assert_eq!(subscription.try_next(), Some(0));
            assert_eq!(subscription.try_next(), Some(1));
            assert_eq!(subscription.try_next(), Some(2));
            assert_eq!(subscription.try_next(), None);
        }
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let feed = Feed::new("a");
        let kept = feed.subscribe();
        drop(feed.subscribe());

        assert_eq!(feed.observer_count(), 1);
        assert_eq!(feed.publish("b"), 1);
        drop(kept);
        assert_eq!(feed.publish("c"), 0);
        assert_eq!(feed.latest(), "c");
    }

    #[tokio::test]
    async fn close_ends_streams_after_buffered_values() {
        let feed = Feed::new(10);
        let subscription = feed.subscribe();
        feed.publish(11);
        feed.close();

        assert_eq!(feed.publish(12), 0);
        let values: Vec<i32> = subscription.collect().await;
        assert_eq!(values, vec![10, 11]);
        assert!(feed.is_closed());
    }

    #[tokio::test]
    async fn subscribe_after_close_yields_final_value_then_ends() {
        let feed = Feed::new(String::from("final"));
        feed.close();

        let mut subscription = feed.subscribe();
        assert_eq!(subscription.next().await.as_deref(), Some("final"));
        assert_eq!(subscription.next().await, None);
    }
}
