//! Event batches handed to a dispatcher.

use chrono::{DateTime, Utc};

use super::{Direction, Event};

/// Version string reported with every batch.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// An ordered group of events for one submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub events: Vec<Event>,
    pub client_version: String,
    pub batch_timestamp: DateTime<Utc>,
}

impl Batch {
    /// Package events, stamping the batch with the current time.
    #[must_use]
    pub fn new(events: Vec<Event>, client_version: impl Into<String>) -> Self {
        Self {
            events,
            client_version: client_version.into(),
            batch_timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events travelling in the given direction.
    #[must_use]
    pub fn count(&self, direction: Direction) -> usize {
        self.events
            .iter()
            .filter(|e| e.direction == direction)
            .count()
    }

    /// Total payload bytes in the batch.
    #[must_use]
    pub fn payload_bytes(&self) -> usize {
        self.events.iter().map(|e| e.size).sum()
    }
}
