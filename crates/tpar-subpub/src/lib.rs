//! A single-producer, many-subscriber fan-out stream (spec.md §4.C).
//!
//! A `SubPub<A, R>` has exactly one producer, created alongside it by
//! [`SubPub::from_producer`]. The producer pushes items of type `A` and
//! eventually finishes with either a success value `R` or a failure message.
//! Any number of subscribers may attach at any point via [`SubPub::subscribe`]
//! and each receives every item pushed *after* it subscribes, followed by the
//! terminal event once the producer finishes. A subscriber that attaches
//! after the producer has already finished gets just the terminal event: it
//! is not a replay log.
//!
//! The producer and every subscriber talk to a single actor task, so a
//! subscribe request is always resolved relative to a definite position in
//! the item sequence — there's no way for a subscription to race an
//! in-flight item and non-deterministically miss or duplicate it.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

/// The FIFO depth of the channel between the producer and the fan-out actor.
/// Once full, [`Producer::push`] blocks: a slow set of subscribers applies
/// backpressure to the producer rather than buffering without bound.
pub const DEFAULT_CAPACITY: usize = 10;

/// One item delivered to a subscriber, or the terminal event that ends the
/// stream. After a `Done` or `Failed`, a subscriber receives nothing further
/// and its stream ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event<A, R> {
    Item(A),
    Done(R),
    Failed(String),
}

enum ProducerMsg<A, R> {
    Item(A),
    Done(R),
    Failed(String),
}

enum Command<A, R> {
    Subscribe(oneshot::Sender<UnboundedReceiverStream<Event<A, R>>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Outcome<R> {
    Done(R),
    Failed(String),
}

impl<R: Clone> Outcome<R> {
    fn to_event<A>(&self) -> Event<A, R> {
        match self {
            Outcome::Done(r) => Event::Done(r.clone()),
            Outcome::Failed(msg) => Event::Failed(msg.clone()),
        }
    }
}

/// A handle for subscribing to a stream. Cloneable and cheap: every clone
/// talks to the same underlying actor task.
#[derive(Clone)]
pub struct SubPub<A, R> {
    cmd_tx: mpsc::UnboundedSender<Command<A, R>>,
}

/// The single producer half of a [`SubPub`]. Dropping it without calling
/// [`Producer::finish_done`] or [`Producer::finish_failed`] finishes the
/// stream as `Failed("producer dropped without finishing")`.
pub struct Producer<A, R> {
    tx: Option<mpsc::Sender<ProducerMsg<A, R>>>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("subpub actor is no longer running")]
pub struct Closed;

impl<A, R> SubPub<A, R>
where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    /// Creates a stream and its producer with the default capacity.
    pub fn from_producer() -> (Self, Producer<A, R>) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Producer<A, R>) {
        let (items_tx, items_rx) = mpsc::channel(capacity);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(items_rx, cmd_rx));
        (
            SubPub { cmd_tx },
            Producer {
                tx: Some(items_tx),
            },
        )
    }

    /// Subscribes to the stream, returning a stream of every item pushed
    /// from this point forward plus the eventual terminal event. Returns
    /// `Err(Closed)` only if the actor task itself has already shut down,
    /// which happens once every `SubPub`/`Producer` handle has been dropped.
    pub async fn subscribe(&self) -> Result<UnboundedReceiverStream<Event<A, R>>, Closed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe(reply_tx))
            .map_err(|_| Closed)?;
        reply_rx.await.map_err(|_| Closed)
    }
}

impl<A, R> Producer<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub async fn push(&self, item: A) -> Result<(), Closed> {
        let tx = self.tx.as_ref().ok_or(Closed)?;
        tx.send(ProducerMsg::Item(item)).await.map_err(|_| Closed)
    }

    pub async fn finish_done(mut self, result: R) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(ProducerMsg::Done(result)).await;
        }
    }

    pub async fn finish_failed(mut self, message: impl Into<String>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(ProducerMsg::Failed(message.into())).await;
        }
    }
}

async fn run<A, R>(
    mut items_rx: mpsc::Receiver<ProducerMsg<A, R>>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command<A, R>>,
) where
    A: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    let mut subscribers: Vec<mpsc::UnboundedSender<Event<A, R>>> = Vec::new();
    let mut outcome: Option<Outcome<R>> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Subscribe(reply)) => {
                        let (tx, rx) = mpsc::unbounded_channel();
                        match &outcome {
                            Some(o) => {
                                let _ = tx.send(o.to_event());
                            }
                            None => subscribers.push(tx),
                        }
                        let _ = reply.send(UnboundedReceiverStream::new(rx));
                    }
                    None => break,
                }
            }
            msg = items_rx.recv(), if outcome.is_none() => {
                match msg {
                    Some(ProducerMsg::Item(item)) => {
                        subscribers.retain(|tx| tx.send(Event::Item(item.clone())).is_ok());
                    }
                    Some(ProducerMsg::Done(result)) => {
                        broadcast_terminal(&mut subscribers, Outcome::Done(result.clone()));
                        outcome = Some(Outcome::Done(result));
                    }
                    Some(ProducerMsg::Failed(message)) => {
                        broadcast_terminal(&mut subscribers, Outcome::Failed(message.clone()));
                        outcome = Some(Outcome::Failed(message));
                    }
                    None => {
                        let message = "producer dropped without finishing".to_string();
                        broadcast_terminal(&mut subscribers, Outcome::Failed(message.clone()));
                        outcome = Some(Outcome::Failed(message));
                    }
                }
            }
        }
    }
    trace!("subpub actor shutting down, every handle dropped");
}

fn broadcast_terminal<A, R: Clone>(
    subscribers: &mut Vec<mpsc::UnboundedSender<Event<A, R>>>,
    outcome: Outcome<R>,
) {
    for tx in subscribers.drain(..) {
        let _ = tx.send(outcome.to_event());
    }
}

/// A cheap, cloneable capability for subscribing to a stream owned
/// elsewhere, as opposed to owning the stream's actor directly. Used when a
/// `SubPub` needs to be looked up by id rather than passed by value (see the
/// `StreamId` newtype in `tpar-base`).
pub type SharedSubPub<A, R> = Arc<SubPub<A, R>>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn subscriber_receives_items_then_done() {
        let (subpub, producer) = SubPub::<i32, &'static str>::from_producer();
        let mut sub = subpub.subscribe().await.unwrap();

        producer.push(1).await.unwrap();
        producer.push(2).await.unwrap();
        producer.finish_done("ok").await;

        assert_eq!(sub.next().await, Some(Event::Item(1)));
        assert_eq!(sub.next().await, Some(Event::Item(2)));
        assert_eq!(sub.next().await, Some(Event::Done("ok")));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn late_subscriber_after_done_gets_only_terminal() {
        let (subpub, producer) = SubPub::<i32, &'static str>::from_producer();
        producer.push(1).await.unwrap();
        producer.finish_done("ok").await;

        // give the actor a chance to process the finish before subscribing
        tokio::task::yield_now().await;

        let mut sub = subpub.subscribe().await.unwrap();
        assert_eq!(sub.next().await, Some(Event::Done("ok")));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn two_subscribers_both_see_every_item() {
        let (subpub, producer) = SubPub::<i32, &'static str>::from_producer();
        let mut sub_a = subpub.subscribe().await.unwrap();
        let mut sub_b = subpub.subscribe().await.unwrap();

        producer.push(7).await.unwrap();
        producer.finish_done("done").await;

        assert_eq!(sub_a.next().await, Some(Event::Item(7)));
        assert_eq!(sub_b.next().await, Some(Event::Item(7)));
        assert_eq!(sub_a.next().await, Some(Event::Done("done")));
        assert_eq!(sub_b.next().await, Some(Event::Done("done")));
    }

    #[tokio::test]
    async fn dropping_producer_without_finishing_fails_subscribers() {
        let (subpub, producer) = SubPub::<i32, &'static str>::from_producer();
        let mut sub = subpub.subscribe().await.unwrap();
        drop(producer);

        match sub.next().await {
            Some(Event::Failed(_)) => {}
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn push_blocks_once_capacity_is_full() {
        let (subpub, producer) = SubPub::<i32, &'static str>::with_capacity(1);
        // No subscriber draining: the second push should need the first to
        // be picked up by the actor before it can proceed, but never panics
        // or loses data.
        producer.push(1).await.unwrap();
        producer.push(2).await.unwrap();
        producer.finish_done("ok").await;

        let mut sub = subpub.subscribe().await.unwrap();
        // The first two items were pushed before anyone subscribed, so the
        // late subscriber only sees the terminal event.
        assert_eq!(sub.next().await, Some(Event::Done("ok")));
    }
}
