//! Delivery queue between the frame parser and the dispatcher
//!
//! Bounded in both policies. `Block` is an mpsc channel whose sender waits
//! for space; `DropOldest` is a single-receiver broadcast channel, which
//! overwrites its oldest slot when full and reports the gap to the receiver
//! as a lag count.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::{config::OverflowPolicy, event::AmiEvent};

/// Producer side, owned by the session supervisor.
#[derive(Debug)]
pub(crate) enum EventSender {
    Block(mpsc::Sender<AmiEvent>),
    DropOldest(broadcast::Sender<AmiEvent>),
}

/// Consumer side, owned by the dispatcher.
#[derive(Debug)]
pub(crate) struct EventReceiver {
    inner: ReceiverInner,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug)]
enum ReceiverInner {
    Block(mpsc::Receiver<AmiEvent>),
    DropOldest(broadcast::Receiver<AmiEvent>),
}

/// Build a queue of `capacity` events. `dropped` accumulates events lost to
/// the drop-oldest policy.
pub(crate) fn delivery_queue(
    capacity: usize,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
) -> (EventSender, EventReceiver) {
    let capacity = capacity.max(1);
    match policy {
        OverflowPolicy::Block => {
            let (tx, rx) = mpsc::channel(capacity);
            (
                EventSender::Block(tx),
                EventReceiver {
                    inner: ReceiverInner::Block(rx),
                    dropped,
                },
            )
        }
        OverflowPolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (
                EventSender::DropOldest(tx),
                EventReceiver {
                    inner: ReceiverInner::DropOldest(rx),
                    dropped,
                },
            )
        }
    }
}

impl EventSender {
    /// Queue one event. Returns `false` if the receiver is gone.
    ///
    /// Waits for space under `Block`; never waits under `DropOldest`.
    pub(crate) async fn deliver(&self, event: AmiEvent) -> bool {
        match self {
            EventSender::Block(tx) => tx
                .send(event)
                .await
                .is_ok(),
            EventSender::DropOldest(tx) => tx
                .send(event)
                .is_ok(),
        }
    }
}

impl EventReceiver {
    /// Next event in arrival order, or `None` once the producer is gone and
    /// the queue is drained.
    pub(crate) async fn recv(&mut self) -> Option<AmiEvent> {
        match &mut self.inner {
            ReceiverInner::Block(rx) => rx
                .recv()
                .await,
            ReceiverInner::DropOldest(rx) => loop {
                match rx
                    .recv()
                    .await
                {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        self.dropped
                            .fetch_add(n, Ordering::Relaxed);
                        warn!("Event queue full, dropped {} oldest events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: usize) -> AmiEvent {
        [("Event", "UserEvent".to_string()), ("Seq", i.to_string())]
            .into_iter()
            .collect()
    }

    fn seq(event: &AmiEvent) -> usize {
        event
            .header("Seq")
            .unwrap()
            .parse()
            .unwrap()
    }

    #[tokio::test]
    async fn block_preserves_fifo() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = delivery_queue(16, OverflowPolicy::Block, dropped.clone());
        for i in 0..10 {
            assert!(tx
                .deliver(numbered(i))
                .await);
        }
        drop(tx);

        let mut got = Vec::new();
        while let Some(event) = rx
            .recv()
            .await
        {
            got.push(seq(&event));
        }
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn block_waits_when_full() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = delivery_queue(1, OverflowPolicy::Block, dropped);
        assert!(tx
            .deliver(numbered(0))
            .await);

        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            tx.deliver(numbered(1)),
        )
        .await;
        assert!(pending.is_err(), "second deliver should wait for space");

        assert_eq!(
            seq(&rx
                .recv()
                .await
                .unwrap()),
            0
        );
        assert!(tx
            .deliver(numbered(2))
            .await);
    }

    #[tokio::test]
    async fn drop_oldest_keeps_newest() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = delivery_queue(4, OverflowPolicy::DropOldest, dropped.clone());
        for i in 0..10 {
            assert!(tx
                .deliver(numbered(i))
                .await);
        }
        drop(tx);

        let mut got = Vec::new();
        while let Some(event) = rx
            .recv()
            .await
        {
            got.push(seq(&event));
        }
        assert_eq!(got, vec![6, 7, 8, 9]);
        assert_eq!(dropped.load(Ordering::Relaxed), 6);
    }

    #[tokio::test]
    async fn deliver_fails_without_receiver() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, rx) = delivery_queue(4, OverflowPolicy::Block, dropped);
        drop(rx);
        assert!(!tx
            .deliver(numbered(0))
            .await);
    }
}
