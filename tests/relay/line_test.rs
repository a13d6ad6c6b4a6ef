//! Tests for line forwarding under queue pressure and stream failures.

use std::io;
use std::time::Duration;

use chrono::Utc;
use kilometers::event::{Direction, EventIdGenerator};
use kilometers::relay::{event_queue, LineRelay, RelayEnd};

fn request_line(n: usize) -> String {
    format!("{{\"jsonrpc\":\"2.0\",\"method\":\"tools/call\",\"id\":{n}}}\n")
}

#[tokio::test]
async fn full_queue_drops_exactly_the_excess() {
    const CAPACITY: usize = 5;
    const EXTRA: usize = 7;

    let input: String = (0..CAPACITY + EXTRA).map(request_line).collect();
    // Receiver held but never drained.
    let (tx, _rx) = event_queue(CAPACITY);
    let mut output = Vec::new();

    let stats = LineRelay::new(
        Direction::Request,
        input.as_bytes(),
        &mut output,
        tx.clone(),
        EventIdGenerator::new(1),
    )
    .run()
    .await;

    assert_eq!(output, input.as_bytes());
    assert_eq!(stats.lines, (CAPACITY + EXTRA) as u64);
    assert_eq!(stats.captured, CAPACITY as u64);
    assert_eq!(stats.dropped, EXTRA as u64);
    assert_eq!(tx.dropped(), EXTRA as u64);
}

#[tokio::test]
async fn mixed_traffic_forwarded_verbatim() {
    let input = concat!(
        "{\"jsonrpc\":\"2.0\",\"method\":\"initialize\",\"id\":0}\n",
        "Starting server on stdio...\n",
        "{\"jsonrpc\":\"1.0\",\"method\":\"old\",\"id\":1}\n",
        "\n",
        "{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{}}\r\n",
        "[1,2,3]\n",
        "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}",
    );
    let (tx, mut rx) = event_queue(16);
    let mut output = Vec::new();

    let stats = LineRelay::new(
        Direction::Response,
        input.as_bytes(),
        &mut output,
        tx,
        EventIdGenerator::new(1),
    )
    .run()
    .await;

    assert_eq!(output, input.as_bytes());
    assert_eq!(stats.lines, 7);
    assert_eq!(stats.captured, 3);

    let mut methods = Vec::new();
    while let Some(event) = rx.recv().await {
        assert_eq!(event.direction, Direction::Response);
        assert!(!event.payload.ends_with(b"\n"));
        assert!(!event.payload.ends_with(b"\r"));
        methods.push(event.method);
    }
    assert_eq!(
        methods,
        vec![
            Some("initialize".to_string()),
            None,
            Some("notifications/initialized".to_string()),
        ]
    );
}

#[tokio::test]
async fn read_error_ends_relay_after_forwarding() {
    let reader = tokio_test::io::Builder::new()
        .read(b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n")
        .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        .build();
    let (tx, mut rx) = event_queue(4);
    let mut output = Vec::new();

    let stats = LineRelay::new(
        Direction::Request,
        reader,
        &mut output,
        tx,
        EventIdGenerator::new(1),
    )
    .run()
    .await;

    assert_eq!(stats.end, RelayEnd::Failed);
    assert_eq!(stats.lines, 1);
    assert_eq!(output, b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n");
    assert_eq!(rx.recv().await.unwrap().method.as_deref(), Some("ping"));
}

#[tokio::test]
async fn write_error_ends_relay_without_capture() {
    let writer = tokio_test::io::Builder::new()
        .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        .build();
    let (tx, mut rx) = event_queue(4);

    let stats = LineRelay::new(
        Direction::Request,
        &b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n"[..],
        writer,
        tx,
        EventIdGenerator::new(1),
    )
    .run()
    .await;

    assert_eq!(stats.end, RelayEnd::Failed);
    assert_eq!(stats.lines, 0);
    assert_eq!(stats.captured, 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn close_on_eof_shuts_down_destination() {
    let (tx, _rx) = event_queue(4);
    let (writer, mut peer) = tokio::io::duplex(256);

    let stats = LineRelay::new(
        Direction::Request,
        &b"hello\n"[..],
        writer,
        tx,
        EventIdGenerator::new(1),
    )
    .close_on_eof(true)
    .run()
    .await;
    assert_eq!(stats.end, RelayEnd::Eof);

    let mut received = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut peer, &mut received)
        .await
        .unwrap();
    assert_eq!(received, b"hello\n");
}

#[tokio::test]
async fn timestamp_taken_when_line_is_read() {
    const LINE: &[u8] = b"{\"jsonrpc\":\"2.0\",\"method\":\"ping\",\"id\":1}\n";

    // The destination stalls before accepting the line.
    let writer = tokio_test::io::Builder::new()
        .wait(Duration::from_millis(300))
        .write(LINE)
        .build();
    let (tx, mut rx) = event_queue(4);

    let before = Utc::now();
    let stats = LineRelay::new(
        Direction::Request,
        LINE,
        writer,
        tx,
        EventIdGenerator::new(1),
    )
    .run()
    .await;
    let finished = Utc::now();

    assert_eq!(stats.end, RelayEnd::Eof);
    assert!(finished - before >= chrono::Duration::milliseconds(300));

    let event = rx.recv().await.unwrap();
    let lag = event.timestamp - before;
    assert!(
        lag < chrono::Duration::milliseconds(100),
        "event stamped {}ms after the read",
        lag.num_milliseconds()
    );
}
