//! Wire format for batch submission.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Batch, Direction, Event};

/// An event as the collection API expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Base64 of the raw line.
    pub payload: String,
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

impl EventDto {
    #[must_use]
    pub fn from_event(event: &Event, customer_id: Option<&str>) -> Self {
        Self {
            id: event.id.clone(),
            timestamp: event.timestamp,
            direction: event.direction,
            method: event.method.clone(),
            payload: STANDARD.encode(&event.payload),
            size: event.size,
            customer_id: customer_id.map(String::from),
        }
    }
}

/// Request body for `POST /api/events/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDto {
    pub events: Vec<EventDto>,
    pub client_version: String,
    pub batch_timestamp: DateTime<Utc>,
}

impl BatchDto {
    #[must_use]
    pub fn from_batch(batch: &Batch, customer_id: Option<&str>) -> Self {
        Self {
            events: batch
                .events
                .iter()
                .map(|e| EventDto::from_event(e, customer_id))
                .collect(),
            client_version: batch.client_version.clone(),
            batch_timestamp: batch.batch_timestamp,
        }
    }
}
