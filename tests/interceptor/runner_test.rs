//! End-to-end tests for the interceptor runner.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use kilometers::event::Direction;
use kilometers::interceptor::{
    InterceptError, Interceptor, InterceptorOptions, InterceptorState,
};
use kilometers::process::{CommandSpec, SpawnError};
use kilometers::relay::RelayEnd;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::common::{FailingDispatcher, RecordingDispatcher};

const PING: &str = "{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n";

#[tokio::test]
async fn echo_child_round_trip_produces_one_batch() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder.clone());

    let (mut client_in, wrapper_in) = tokio::io::duplex(1024);
    let (wrapper_out, client_out) = tokio::io::duplex(1024);

    let run = tokio::spawn(async move {
        let report = interceptor
            .run_with_io(
                &CommandSpec::new("cat"),
                wrapper_in,
                wrapper_out,
                tokio::io::sink(),
            )
            .await;
        (interceptor, report)
    });

    client_in.write_all(PING.as_bytes()).await.unwrap();
    let mut client_out = BufReader::new(client_out);
    let mut echoed = String::new();
    client_out.read_line(&mut echoed).await.unwrap();
    assert_eq!(echoed, PING);

    drop(client_in);
    let (interceptor, report) = run.await.unwrap();
    let report = report.unwrap();

    assert_eq!(interceptor.state(), InterceptorState::Terminated);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.requests.end, RelayEnd::Eof);
    assert_eq!(report.pipeline.requests, 1);
    assert_eq!(report.pipeline.responses, 1);
    assert_eq!(report.dropped, 0);

    let batches = recorder.batches();
    assert_eq!(batches.len(), 1);
    let batch = &batches[0];
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.count(Direction::Request), 1);
    assert_eq!(batch.count(Direction::Response), 1);
    for event in &batch.events {
        assert_eq!(event.method.as_deref(), Some("ping"));
        assert_eq!(event.payload, PING.trim_end().as_bytes());
        assert_eq!(event.size, 40);
    }
    assert_ne!(batch.events[0].id, batch.events[1].id);
    let pid = report.pid.unwrap().to_string();
    assert!(batch.events[0].id.ends_with(&format!("-{pid}")));
}

#[tokio::test]
async fn failing_dispatcher_does_not_affect_child() {
    let failing = Arc::new(FailingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), failing.clone());

    let input = format!("{PING}not json\n");
    let (wrapper_out, mut client_out) = tokio::io::duplex(1024);

    let report = interceptor
        .run_with_io(
            &CommandSpec::new("cat"),
            std::io::Cursor::new(input.clone().into_bytes()),
            wrapper_out,
            tokio::io::sink(),
        )
        .await
        .unwrap();

    let mut output = String::new();
    client_out.read_to_string(&mut output).await.unwrap();

    assert_eq!(output, input);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(failing.attempts(), 1);
    assert_eq!(report.pipeline.batches_failed, 1);
    assert_eq!(report.pipeline.events_lost, 2);
}

#[tokio::test]
async fn spawn_failure_aborts_at_starting() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder.clone());

    let result = interceptor
        .run_with_io(
            &CommandSpec::new("km-test-binary-that-does-not-exist"),
            tokio::io::empty(),
            tokio::io::sink(),
            tokio::io::sink(),
        )
        .await;

    assert!(matches!(
        result,
        Err(InterceptError::Spawn(SpawnError::NotFound(_)))
    ));
    assert_eq!(interceptor.state(), InterceptorState::Starting);
    assert!(recorder.batches().is_empty());
}

#[tokio::test]
async fn interceptor_runs_only_once() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder);
    let spec = CommandSpec::new("true");

    interceptor
        .run_with_io(&spec, tokio::io::empty(), tokio::io::sink(), tokio::io::sink())
        .await
        .unwrap();

    let second = interceptor
        .run_with_io(&spec, tokio::io::empty(), tokio::io::sink(), tokio::io::sink())
        .await;
    assert!(matches!(second, Err(InterceptError::State(_))));
}

#[tokio::test]
async fn exit_code_is_preserved() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder);

    let report = interceptor
        .run_with_io(
            &CommandSpec::new("sh").args(["-c", "exit 3"]),
            tokio::io::empty(),
            tokio::io::sink(),
            tokio::io::sink(),
        )
        .await
        .unwrap();

    assert_eq!(report.exit_code(), 3);
}

#[tokio::test]
async fn child_exit_stops_idle_stdin_relay() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder);

    // The client side stays open for the whole session.
    let (_client_in, wrapper_in) = tokio::io::duplex(64);

    let report = interceptor
        .run_with_io(
            &CommandSpec::new("sh").args(["-c", "exit 0"]),
            wrapper_in,
            tokio::io::sink(),
            tokio::io::sink(),
        )
        .await
        .unwrap();

    assert_eq!(report.requests.end, RelayEnd::Shutdown);
    assert_eq!(interceptor.state(), InterceptorState::Terminated);
}

#[tokio::test]
async fn stderr_passes_through_untouched() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder.clone());
    let (wrapper_err, mut client_err) = tokio::io::duplex(1024);

    let report = interceptor
        .run_with_io(
            &CommandSpec::new("sh").args([
                "-c",
                "echo '{\"jsonrpc\":\"2.0\",\"method\":\"log\"}' >&2",
            ]),
            tokio::io::empty(),
            tokio::io::sink(),
            wrapper_err,
        )
        .await
        .unwrap();

    let mut stderr = String::new();
    client_err.read_to_string(&mut stderr).await.unwrap();
    assert_eq!(stderr, "{\"jsonrpc\":\"2.0\",\"method\":\"log\"}\n");
    assert_eq!(report.stderr_bytes, stderr.len() as u64);
    // Stderr is never inspected.
    assert_eq!(report.pipeline.events(), 0);
    assert!(recorder.batches().is_empty());
}

#[tokio::test]
async fn bytes_preserved_under_queue_pressure() {
    const LINES: usize = 500;

    let recorder = Arc::new(RecordingDispatcher::default());
    let options = InterceptorOptions {
        batch_size: 1,
        queue_capacity: 2,
        ..Default::default()
    };
    let mut interceptor = Interceptor::new(options, recorder.clone());

    let input: String = (0..LINES)
        .map(|n| {
            if n % 2 == 0 {
                format!("{{\"jsonrpc\":\"2.0\",\"method\":\"tools/call\",\"id\":{n}}}\n")
            } else {
                format!("plain line {n}\n")
            }
        })
        .collect();

    let (mut client_in, wrapper_in) = tokio::io::duplex(4096);
    let (wrapper_out, mut client_out) = tokio::io::duplex(4096);

    let payload = input.clone();
    let writer = tokio::spawn(async move {
        client_in.write_all(payload.as_bytes()).await.unwrap();
    });
    let reader = tokio::spawn(async move {
        let mut output = Vec::new();
        client_out.read_to_end(&mut output).await.unwrap();
        output
    });

    let report = interceptor
        .run_with_io(
            &CommandSpec::new("cat"),
            wrapper_in,
            wrapper_out,
            tokio::io::sink(),
        )
        .await
        .unwrap();
    writer.await.unwrap();
    let output = reader.await.unwrap();

    assert_eq!(output, input.as_bytes());
    assert_eq!(report.exit_code(), 0);

    let captured_per_direction = (LINES / 2) as u64;
    assert_eq!(
        report.requests.captured + report.requests.dropped,
        captured_per_direction
    );
    assert_eq!(
        report.responses.captured + report.responses.dropped,
        captured_per_direction
    );
    assert_eq!(
        report.pipeline.events() + report.dropped,
        2 * captured_per_direction
    );
    let dispatched: usize = recorder.batches().iter().map(|b| b.len()).sum();
    assert_eq!(dispatched as u64, report.pipeline.events());
}

/// Output stream whose first write panics.
struct PanickingWriter;

impl AsyncWrite for PanickingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        panic!("output stream torn down");
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn worker_panic_still_joins_every_worker() {
    let recorder = Arc::new(RecordingDispatcher::default());
    let mut interceptor = Interceptor::new(InterceptorOptions::default(), recorder.clone());

    let result = interceptor
        .run_with_io(
            &CommandSpec::new("cat"),
            std::io::Cursor::new(PING.as_bytes().to_vec()),
            PanickingWriter,
            tokio::io::sink(),
        )
        .await;

    assert!(matches!(result, Err(InterceptError::Join(_))));
    assert_eq!(interceptor.state(), InterceptorState::Terminated);

    // The pipeline was joined too, so the request event has been flushed.
    let batches = recorder.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].count(Direction::Request), 1);
    assert_eq!(batches[0].count(Direction::Response), 0);
}
