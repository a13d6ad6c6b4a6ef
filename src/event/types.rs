//! Captured event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::Envelope;

use super::EventIdGenerator;

/// Which side of the wrapped process a line travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client to child (our stdin to the child's stdin).
    Request,
    /// Child to client (the child's stdout to our stdout).
    Response,
}

impl Direction {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured protocol message.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique identifier, see [`EventIdGenerator`].
    pub id: String,
    /// When the line was read.
    pub timestamp: DateTime<Utc>,
    /// Direction of travel.
    pub direction: Direction,
    /// JSON-RPC method, absent for responses.
    pub method: Option<String>,
    /// The line as read, without its terminator.
    pub payload: Vec<u8>,
    /// Payload length in bytes.
    pub size: usize,
}

impl Event {
    /// Build an event from a relayed line and its detected envelope.
    ///
    /// `read_at` is when the line came off the source stream.
    #[must_use]
    pub fn capture(
        ids: &EventIdGenerator,
        direction: Direction,
        envelope: &Envelope,
        line: &[u8],
        read_at: DateTime<Utc>,
    ) -> Self {
        let payload = strip_terminator(line).to_vec();
        Self {
            id: ids.next_id(),
            timestamp: read_at,
            direction,
            method: envelope.method.clone(),
            size: payload.len(),
            payload,
        }
    }
}

/// Remove a trailing `\n` or `\r\n`.
#[must_use]
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
