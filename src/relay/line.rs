//! Newline-delimited forwarding with side-channel event capture.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::event::{Direction, Event, EventIdGenerator};
use crate::protocol::detect;

use super::{EventSender, QueueError, StreamError};

/// Why a relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayEnd {
    /// The source reached end of input.
    #[default]
    Eof,
    /// The orchestrator asked the relay to stop.
    Shutdown,
    /// A read or write failed.
    Failed,
}

/// Counters reported by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Lines (or final unterminated chunks) forwarded.
    pub lines: u64,
    /// Bytes forwarded.
    pub bytes: u64,
    /// Events accepted by the queue.
    pub captured: u64,
    /// Events rejected by the queue.
    pub dropped: u64,
    pub end: RelayEnd,
}

/// Unidirectional line forwarder.
///
/// Each line is written and flushed to the destination before detection runs.
/// Detected envelopes become events offered to the queue without waiting.
pub struct LineRelay<R, W> {
    direction: Direction,
    reader: BufReader<R>,
    writer: W,
    events: EventSender,
    ids: EventIdGenerator,
    close_on_eof: bool,
    shutdown: Option<CancellationToken>,
}

impl<R, W> LineRelay<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a relay tagging captured events with `direction`.
    pub fn new(
        direction: Direction,
        reader: R,
        writer: W,
        events: EventSender,
        ids: EventIdGenerator,
    ) -> Self {
        Self {
            direction,
            reader: BufReader::new(reader),
            writer,
            events,
            ids,
            close_on_eof: false,
            shutdown: None,
        }
    }

    /// Shut down the destination's write side when the source ends.
    #[must_use]
    pub fn close_on_eof(mut self, close: bool) -> Self {
        self.close_on_eof = close;
        self
    }

    /// Stop waiting for input once `token` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Forward until end of input, a stream error or shutdown.
    ///
    /// Stream errors end only this relay; they are logged and reflected in
    /// the returned stats.
    pub async fn run(mut self) -> RelayStats {
        let mut stats = RelayStats::default();

        stats.end = match self.forward(&mut stats).await {
            Ok(end) => end,
            Err(e) => {
                tracing::warn!(direction = %self.direction, error = %e, "Relay stopped");
                RelayEnd::Failed
            }
        };

        tracing::debug!(
            direction = %self.direction,
            lines = stats.lines,
            bytes = stats.bytes,
            captured = stats.captured,
            dropped = stats.dropped,
            end = ?stats.end,
            "Relay finished"
        );
        stats
    }

    async fn forward(&mut self, stats: &mut RelayStats) -> Result<RelayEnd, StreamError> {
        let direction = self.direction;
        let mut line = Vec::with_capacity(4096);

        loop {
            line.clear();

            let read = match &self.shutdown {
                Some(token) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return Ok(RelayEnd::Shutdown),
                        read = self.reader.read_until(b'\n', &mut line) => read,
                    }
                }
                None => self.reader.read_until(b'\n', &mut line).await,
            };
            let n = read.map_err(|source| StreamError::Read { direction, source })?;
            let read_at = Utc::now();

            if n == 0 {
                self.finish().await?;
                return Ok(RelayEnd::Eof);
            }

            self.writer
                .write_all(&line)
                .await
                .map_err(|source| StreamError::Write { direction, source })?;
            self.writer
                .flush()
                .await
                .map_err(|source| StreamError::Write { direction, source })?;

            stats.lines += 1;
            stats.bytes += n as u64;

            self.capture(&line, read_at, stats);
        }
    }

    fn capture(&self, line: &[u8], read_at: DateTime<Utc>, stats: &mut RelayStats) {
        let Some(envelope) = detect(line) else {
            return;
        };

        let event = Event::capture(&self.ids, self.direction, &envelope, line, read_at);
        match self.events.offer(event) {
            Ok(()) => {
                stats.captured += 1;
                tracing::trace!(
                    direction = %self.direction,
                    kind = ?envelope.kind(),
                    method = envelope.method().unwrap_or("-"),
                    "Captured event"
                );
            }
            Err(QueueError::Full) => {
                stats.dropped += 1;
                tracing::warn!(
                    direction = %self.direction,
                    method = envelope.method().unwrap_or("-"),
                    "Event buffer full, dropping event"
                );
            }
            Err(QueueError::Closed) => {
                stats.dropped += 1;
                tracing::debug!(direction = %self.direction, "Event queue closed, dropping event");
            }
        }
    }

    async fn finish(&mut self) -> Result<(), StreamError> {
        let direction = self.direction;
        let result = if self.close_on_eof {
            self.writer.shutdown().await
        } else {
            self.writer.flush().await
        };
        result.map_err(|source| StreamError::Write { direction, source })
    }
}
