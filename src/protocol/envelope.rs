//! Envelope detection for line-delimited JSON-RPC 2.0 traffic.
//!
//! Detection runs on every relayed line, so it never allocates an error and
//! rejects anything that cannot be an object before invoking the JSON parser.

use serde::Deserialize;

/// The only protocol version that produces an envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Structural fields of a JSON-RPC message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    /// Protocol version, always `"2.0"` for a detected envelope.
    #[serde(rename = "jsonrpc")]
    pub version: String,
    /// Request identifier. `null` is treated as absent.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    /// Method name for requests and notifications.
    #[serde(default)]
    pub method: Option<String>,
}

/// Message shape derived from which envelope fields are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has both `method` and `id`.
    Request,
    /// Has `method` but no `id`.
    Notification,
    /// Has `id` but no `method`.
    Response,
    /// Neither field present.
    Unknown,
}

impl Envelope {
    /// Classify the message by its fields.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match (self.method.is_some(), self.id.is_some()) {
            (true, true) => MessageKind::Request,
            (true, false) => MessageKind::Notification,
            (false, true) => MessageKind::Response,
            (false, false) => MessageKind::Unknown,
        }
    }

    /// Method name, if any.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }
}

/// Detect a JSON-RPC 2.0 envelope in a single line.
///
/// Returns `None` for anything that is not a JSON object with
/// `"jsonrpc": "2.0"`. Trailing newline bytes are tolerated.
#[must_use]
pub fn detect(line: &[u8]) -> Option<Envelope> {
    let first = line.iter().find(|b| !b.is_ascii_whitespace())?;
    if *first != b'{' {
        return None;
    }

    let envelope: Envelope = serde_json::from_slice(line).ok()?;
    if envelope.version != JSONRPC_VERSION {
        return None;
    }
    Some(envelope)
}
