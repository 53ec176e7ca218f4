//! A typed request/reply primitive layered on top of a framed connection
//! (spec.md §4.B). A connection carries many independent request/reply pairs
//! interleaved on the wire; each request is tagged with a `CorrelationId`
//! that its reply must echo back, so a caller's `call` can await exactly its
//! own reply while other calls (and unsolicited pushes) share the same
//! socket.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::warn;

#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct CorrelationId(pub u64);

/// The correlation id convention for a message pushed to a peer rather than
/// sent in reply to one of its requests. A push is never registered with
/// [`PendingCalls`], so a peer receiving one must recognize it by its
/// payload type rather than by matching a waiter.
pub const PUSH_CORRELATION_ID: CorrelationId = CorrelationId(u64::MAX);

/// Wraps an application-level request/response type with a correlation id,
/// for one side of the wire to send.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    pub correlation_id: CorrelationId,
    pub body: T,
}

/// Allocates correlation ids and matches incoming replies to the caller that
/// is waiting on them. One `PendingCalls` is shared by every task that calls
/// out over a single connection.
pub struct PendingCalls<Reply> {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<CorrelationId, oneshot::Sender<Reply>>>,
}

impl<Reply> Default for PendingCalls<Reply> {
    fn default() -> Self {
        PendingCalls {
            next_id: AtomicU64::new(0),
            waiters: Mutex::new(HashMap::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("connection closed before a reply arrived")]
    Disconnected,
}

impl<Reply: Send + 'static> PendingCalls<Reply> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn fresh_id(&self) -> CorrelationId {
        CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a new outstanding call and returns the id to tag the
    /// request with and a future that resolves when `resolve` is called with
    /// a matching id (or with a `Disconnected` error if `self` is dropped
    /// first, e.g. because the connection died).
    pub async fn register(&self) -> (CorrelationId, oneshot::Receiver<Reply>) {
        let id = self.fresh_id();
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        (id, rx)
    }

    /// Delivers a reply to whichever caller is waiting on `id`. Silently
    /// drops replies with no matching waiter: that's expected when a caller
    /// gave up (e.g. its connection dropped) before the reply arrived.
    pub async fn resolve(&self, id: CorrelationId, reply: Reply) {
        let waiter = self.waiters.lock().await.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => warn!(?id, "reply for unknown or already-resolved correlation id"),
        }
    }

    /// Fails every outstanding call, e.g. when the underlying connection has
    /// been lost and no more replies will ever arrive.
    pub async fn fail_all(&self) {
        let mut waiters = self.waiters.lock().await;
        for (_, tx) in waiters.drain() {
            drop(tx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_the_matching_waiter() {
        let calls = PendingCalls::<u32>::new();
        let (id, rx) = calls.register().await;
        calls.resolve(id, 42).await;
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn two_concurrent_calls_get_their_own_replies() {
        let calls = PendingCalls::<&'static str>::new();
        let (id_a, rx_a) = calls.register().await;
        let (id_b, rx_b) = calls.register().await;
        assert_ne!(id_a, id_b);

        calls.resolve(id_b, "for b").await;
        calls.resolve(id_a, "for a").await;

        assert_eq!(rx_a.await.unwrap(), "for a");
        assert_eq!(rx_b.await.unwrap(), "for b");
    }

    #[tokio::test]
    async fn fail_all_drops_every_waiter() {
        let calls = PendingCalls::<u32>::new();
        let (_id, rx) = calls.register().await;
        calls.fail_all().await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn resolve_with_no_waiter_does_not_panic() {
        let calls = PendingCalls::<u32>::new();
        calls.resolve(CorrelationId(999), 1).await;
    }
}
