//! Queue consumer that groups events into batches.

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::event::{Batch, Direction, Event, CLIENT_VERSION};
use crate::relay::EventReceiver;

/// Default number of events per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Counters reported when the pipeline finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Request events consumed.
    pub requests: u64,
    /// Response events consumed.
    pub responses: u64,
    /// Batches the dispatcher accepted.
    pub batches_sent: u64,
    /// Batches the dispatcher rejected.
    pub batches_failed: u64,
    /// Events lost with rejected batches.
    pub events_lost: u64,
}

impl PipelineStats {
    /// Total events consumed.
    #[must_use]
    pub fn events(&self) -> u64 {
        self.requests + self.responses
    }

    fn record(&mut self, direction: Direction) {
        match direction {
            Direction::Request => self.requests = self.requests.saturating_add(1),
            Direction::Response => self.responses = self.responses.saturating_add(1),
        }
    }
}

/// Single consumer draining the event queue.
pub struct EventPipeline {
    events: EventReceiver,
    dispatcher: Arc<dyn Dispatcher>,
    batch_size: usize,
    client_version: String,
    debug: bool,
}

impl EventPipeline {
    /// Create a pipeline flushing every `batch_size` events.
    #[must_use]
    pub fn new(events: EventReceiver, dispatcher: Arc<dyn Dispatcher>, batch_size: usize) -> Self {
        Self {
            events,
            dispatcher,
            batch_size: batch_size.max(1),
            client_version: CLIENT_VERSION.to_string(),
            debug: false,
        }
    }

    /// Override the version reported with each batch.
    #[must_use]
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Log every payload at debug level.
    #[must_use]
    pub fn debug_payloads(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Consume events until the queue is closed and drained.
    ///
    /// Full batches are dispatched as they fill; whatever remains is
    /// flushed once the queue closes.
    pub async fn run(mut self) -> PipelineStats {
        let mut stats = PipelineStats::default();
        let mut pending: Vec<Event> = Vec::with_capacity(self.batch_size);

        while let Some(event) = self.events.recv().await {
            stats.record(event.direction);
            self.trace_event(&event, &stats);
            pending.push(event);

            if pending.len() >= self.batch_size {
                let full = std::mem::replace(&mut pending, Vec::with_capacity(self.batch_size));
                let dispatcher = self.dispatcher.as_ref();
                dispatch(dispatcher, &self.client_version, full, &mut stats).await;
            }
        }

        if !pending.is_empty() {
            dispatch(
                self.dispatcher.as_ref(),
                &self.client_version,
                pending,
                &mut stats,
            )
            .await;
        }

        tracing::info!(
            requests = stats.requests,
            responses = stats.responses,
            batches_sent = stats.batches_sent,
            batches_failed = stats.batches_failed,
            dropped = self.events.dropped(),
            "Processed {} total events",
            stats.events()
        );
        stats
    }

    fn trace_event(&self, event: &Event, stats: &PipelineStats) {
        tracing::debug!(
            n = stats.events(),
            direction = %event.direction,
            method = event.method.as_deref().unwrap_or("-"),
            size = event.size,
            "Event captured"
        );
        if self.debug {
            tracing::debug!(
                id = %event.id,
                payload = %String::from_utf8_lossy(&event.payload),
                "Event payload"
            );
        }
    }
}

/// Hand one batch to the dispatcher. Failures are logged and the batch dropped.
async fn dispatch(
    dispatcher: &dyn Dispatcher,
    client_version: &str,
    events: Vec<Event>,
    stats: &mut PipelineStats,
) {
    let batch = Batch::new(events, client_version);
    let size = batch.len() as u64;

    match dispatcher.send_batch(&batch).await {
        Ok(()) => stats.batches_sent += 1,
        Err(e) => {
            stats.batches_failed += 1;
            stats.events_lost += size;
            tracing::warn!(events = size, error = %e, "Failed to send event batch, dropping");
        }
    }
}
