//! Relay error types.

use crate::event::Direction;

/// I/O failure that ends a single relay.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    /// Reading from the source stream failed.
    #[error("Failed to read {direction} stream: {source}")]
    Read {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },
    /// Writing to the destination stream failed.
    #[error("Failed to write {direction} stream: {source}")]
    Write {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },
    /// Copying the stderr stream failed.
    #[error("Failed to forward stderr: {0}")]
    Passthrough(#[source] std::io::Error),
}

/// An event could not be enqueued.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("Event queue full")]
    Full,
    /// The consumer is gone.
    #[error("Event queue closed")]
    Closed,
}
