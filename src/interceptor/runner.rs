//! Interceptor runner wiring the child, relays and pipeline together.
//!
//! Shutdown order: the child exits, the stdin relay is told to stop, both
//! relays are joined, and only then is the event queue closed so the pipeline
//! can flush its final partial batch.

use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::config::KmConfig;
use crate::dispatch::Dispatcher;
use crate::event::{Direction, EventIdGenerator, CLIENT_VERSION};
use crate::pipeline::{EventPipeline, PipelineStats, DEFAULT_BATCH_SIZE};
use crate::process::{exit_code, ChildProcess, CommandSpec, SpawnError};
use crate::relay::{event_queue, pass_through, LineRelay, RelayStats, DEFAULT_QUEUE_CAPACITY};

use super::{InterceptorState, InvalidTransition, Lifecycle};

/// Error type for interceptor sessions.
#[derive(thiserror::Error, Debug)]
pub enum InterceptError {
    /// The wrapped process could not be started.
    #[error("Failed to start wrapped process: {0}")]
    Spawn(#[from] SpawnError),
    /// Waiting on the wrapped process failed.
    #[error("Failed to wait for wrapped process: {0}")]
    Wait(#[source] std::io::Error),
    /// A worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    State(#[from] InvalidTransition),
}

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct InterceptorOptions {
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub debug: bool,
    pub client_version: String,
}

impl Default for InterceptorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debug: false,
            client_version: CLIENT_VERSION.to_string(),
        }
    }
}

impl From<&KmConfig> for InterceptorOptions {
    fn from(config: &KmConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            queue_capacity: config.queue_capacity,
            debug: config.debug,
            ..Default::default()
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// The child's exit status.
    pub status: ExitStatus,
    /// Child process id, if it was known at spawn.
    pub pid: Option<u32>,
    /// Stdin to child relay.
    pub requests: RelayStats,
    /// Child stdout to stdout relay.
    pub responses: RelayStats,
    /// Bytes forwarded from the child's stderr.
    pub stderr_bytes: u64,
    pub pipeline: PipelineStats,
    /// Events rejected by the full queue.
    pub dropped: u64,
}

impl SessionReport {
    /// Exit code this process should terminate with.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        exit_code(self.status)
    }
}

/// Runs one wrapped process with capture and dispatch.
pub struct Interceptor {
    options: InterceptorOptions,
    dispatcher: Arc<dyn Dispatcher>,
    lifecycle: Lifecycle,
}

impl Interceptor {
    /// Create an interceptor in the `Created` state.
    #[must_use]
    pub fn new(options: InterceptorOptions, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            options,
            dispatcher,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Create an interceptor from resolved configuration.
    #[must_use]
    pub fn from_config(config: &KmConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::new(InterceptorOptions::from(config), dispatcher)
    }

    #[must_use]
    pub fn state(&self) -> InterceptorState {
        self.lifecycle.state()
    }

    /// Wrap `spec` on this process's standard streams.
    ///
    /// # Errors
    ///
    /// See [`Interceptor::run_with_io`].
    pub async fn run(&mut self, spec: &CommandSpec) -> Result<SessionReport, InterceptError> {
        self.run_with_io(
            spec,
            tokio::io::stdin(),
            tokio::io::stdout(),
            tokio::io::stderr(),
        )
        .await
    }

    /// Wrap `spec`, relaying `input` to the child and the child's output to
    /// `output` and `errors`.
    ///
    /// # Errors
    ///
    /// Returns `InterceptError::Spawn` if the child cannot be started, in
    /// which case no worker has been started. Later errors only occur if a
    /// worker panics or the child cannot be waited on.
    pub async fn run_with_io<I, O, E>(
        &mut self,
        spec: &CommandSpec,
        input: I,
        output: O,
        errors: E,
    ) -> Result<SessionReport, InterceptError>
    where
        I: AsyncRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        self.lifecycle.transition(InterceptorState::Starting)?;

        let (child, pipes) = ChildProcess::spawn(spec).await?;
        let pid = child.id();
        let ids = EventIdGenerator::new(pid.unwrap_or_else(std::process::id));

        let (events_tx, events_rx) = event_queue(self.options.queue_capacity);
        let shutdown = CancellationToken::new();

        let request_relay = LineRelay::new(
            Direction::Request,
            input,
            pipes.stdin,
            events_tx.clone(),
            ids,
        )
        .close_on_eof(true)
        .with_shutdown(shutdown.clone());
        let response_relay = LineRelay::new(
            Direction::Response,
            pipes.stdout,
            output,
            events_tx.clone(),
            ids,
        );
        let pipeline = EventPipeline::new(
            events_rx,
            Arc::clone(&self.dispatcher),
            self.options.batch_size,
        )
        .client_version(self.options.client_version.as_str())
        .debug_payloads(self.options.debug);
        let stderr = pipes.stderr;

        let request_task = tokio::spawn(request_relay.run());
        let response_task = tokio::spawn(response_relay.run());
        let stderr_task = tokio::spawn(async move {
            match pass_through(stderr, errors).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "Stderr forwarding stopped");
                    0
                }
            }
        });
        let pipeline_task = tokio::spawn(pipeline.run());

        self.lifecycle.transition(InterceptorState::Running)?;
        tracing::info!(program = %spec.program(), pid = ?pid, "Started process");

        let status = child.wait().await;
        self.lifecycle.transition(InterceptorState::Draining)?;
        shutdown.cancel();

        // Every worker is joined before any failure is reported.
        let requests = request_task.await;
        let responses = response_task.await;
        let stderr_bytes = stderr_task.await;

        // Both relays are done; dropping the last sender closes the queue.
        let dropped = events_tx.dropped();
        drop(events_tx);
        let pipeline = pipeline_task.await;

        self.lifecycle.transition(InterceptorState::Terminated)?;

        let status = status.map_err(InterceptError::Wait)?;
        let requests = requests?;
        let responses = responses?;
        let stderr_bytes = stderr_bytes?;
        let pipeline = pipeline?;
        if dropped > 0 {
            tracing::warn!(dropped, "Events dropped because the buffer was full");
        }
        tracing::info!(status = %status, "Process exited");

        Ok(SessionReport {
            status,
            pid,
            requests,
            responses,
            stderr_bytes,
            pipeline,
            dropped,
        })
    }
}
