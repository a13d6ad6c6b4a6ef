//! Bounded event queue shared by the relays and the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::event::Event;

use super::QueueError;

/// Default number of events the queue holds before dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Create a bounded queue. A capacity of zero is raised to one.
#[must_use]
pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventReceiver { rx, dropped },
    )
}

/// Producer handle. The queue closes once every sender is dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Enqueue without waiting. A rejected event is counted and discarded.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Full` at capacity and `QueueError::Closed` once
    /// the receiver is gone.
    pub fn offer(&self, event: Event) -> Result<(), QueueError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Closed)
            }
        }
    }

    /// Events rejected so far by any sender of this queue.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Single consumer handle.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl EventReceiver {
    /// Wait for the next event. Returns `None` once the queue is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Events rejected so far by the producers.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
