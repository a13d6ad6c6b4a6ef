//! Dispatcher that only logs.

use async_trait::async_trait;

use crate::event::{Batch, Direction};

use super::{DispatchError, Dispatcher};

/// Logs a summary of each batch instead of submitting it.
///
/// Used when telemetry submission is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn send_batch(&self, batch: &Batch) -> Result<(), DispatchError> {
        tracing::info!(
            events = batch.len(),
            requests = batch.count(Direction::Request),
            responses = batch.count(Direction::Response),
            bytes = batch.payload_bytes(),
            "Captured event batch"
        );
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}
