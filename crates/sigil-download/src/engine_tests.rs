use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;
use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

enum Read {
    Bytes(Vec<u8>),
    WouldBlock,
    Close,
    Error(&'static str),
}

fn bytes(data: &str) -> Read {
    Read::Bytes(data.as_bytes().to_vec())
}

#[derive(Clone, Default)]
struct Wire {
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicUsize>,
}

impl Wire {
    fn written(&self) -> String {
        String::from_utf8(self.written.lock().unwrap().clone()).unwrap()
    }

    fn closes(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeTransport {
    reads: VecDeque<Read>,
    wire: Wire,
    write_limit: usize,
}

impl Transport for FakeTransport {
    fn is_writable(&mut self) -> bool {
        true
    }

    fn try_write(&mut self, buf: &[u8]) -> WriteOutcome {
        let n = buf.len().min(self.write_limit);
        self.wire.written.lock().unwrap().extend_from_slice(&buf[..n]);
        WriteOutcome::Written(n)
    }

    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        match self.reads.pop_front() {
            None | Some(Read::WouldBlock) => ReadOutcome::WouldBlock,
            Some(Read::Bytes(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(Read::Bytes(data[n..].to_vec()));
                }
                ReadOutcome::Data(n)
            },
            Some(Read::Close) => {
                self.reads.push_front(Read::Close);
                ReadOutcome::Closed
            },
            Some(Read::Error(msg)) => ReadOutcome::Error(msg.to_string()),
        }
    }

    fn close(&mut self) {
        self.wire.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeConnector {
    scripts: HashMap<String, VecDeque<(Vec<Read>, Wire)>>,
    connects: Arc<Mutex<Vec<String>>>,
    write_limit: Option<usize>,
}

impl FakeConnector {
    fn serve(&mut self, url: &str, reads: Vec<Read>) -> Wire {
        let wire = Wire::default();
        self.scripts
            .entry(url.to_string())
            .or_default()
            .push_back((reads, wire.clone()));
        wire
    }
}

impl Connector for FakeConnector {
    fn connect(&mut self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        self.connects.lock().unwrap().push(url.to_string());
        let (reads, wire) = self
            .scripts
            .get_mut(url.as_str())
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::Connect(format!("refused: {url}")))?;
        Ok(Box::new(FakeTransport {
            reads: reads.into(),
            wire,
            write_limit: self.write_limit.unwrap_or(usize::MAX),
        }))
    }
}

fn engine(connector: FakeConnector) -> DownloadEngine {
    DownloadEngine::new(Box::new(connector), EngineConfig::default())
}

fn get(url: &str) -> DownloadRequest {
    DownloadRequest::get(Url::parse(url).unwrap())
}

/// Poll until something finishes, returning the events and how many polls
/// it took.
fn run(engine: &mut DownloadEngine) -> (Vec<DownloadEvent>, usize) {
    for polls in 1..=200 {
        let events = engine.poll();
        if !events.is_empty() {
            return (events, polls);
        }
    }
    panic!("no download finished");
}

fn completed(event: &DownloadEvent) -> &DownloadResponse {
    match event {
        DownloadEvent::Completed { response, .. } => response,
        DownloadEvent::Failed { error, .. } => panic!("download failed: {error}"),
    }
}

fn failed(event: &DownloadEvent) -> &DownloadError {
    match event {
        DownloadEvent::Failed { error, .. } => error,
        DownloadEvent::Completed { .. } => panic!("download unexpectedly completed"),
    }
}

const URL: &str = "http://packages.test/app.sgp";

// ---------------------------------------------------------------------------
// Successful transfers
// ---------------------------------------------------------------------------

#[test]
fn test_body_survives_would_block_between_chunks() {
    let mut connector = FakeConnector::default();
    let wire = connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\n"),
        bytes("AB"),
        Read::WouldBlock,
        bytes("CD"),
        Read::WouldBlock,
        bytes("EF"),
    ]);
    let mut engine = engine(connector);
    let handle = engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id(), handle.id());
    let response = completed(&events[0]);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ABCDEF");
    assert_eq!(response.final_url.as_str(), URL);

    assert!(wire.written().starts_with("GET /app.sgp HTTP/1.1\r\n"));
    assert_eq!(wire.closes(), 1);
    assert!(!engine.is_active(handle));
    assert_eq!(engine.active_count(), 0);
}

#[test]
fn test_events_are_reported_exactly_once() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes("HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nX")]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(events.len(), 1);
    for _ in 0..10 {
        assert!(engine.poll().is_empty());
    }
}

#[test]
fn test_one_operation_per_poll() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nA"),
        bytes("B"),
        bytes("C"),
    ]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    // write, then one read per item
    let (_, polls) = run(&mut engine);
    assert_eq!(polls, 4);
}

#[test]
fn test_partial_writes_complete_the_request() {
    let mut connector = FakeConnector {
        write_limit: Some(5),
        ..FakeConnector::default()
    };
    let wire = connector.serve(URL, vec![bytes("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")]);
    let mut engine = engine(connector);
    engine.start(
        DownloadRequest::post(Url::parse(URL).unwrap(), b"hello body".to_vec())
            .with_header("X-Trace", "1"),
    );

    let (events, polls) = run(&mut engine);
    assert!(completed(&events[0]).body.is_empty());
    assert!(polls > 5);

    let written = wire.written();
    assert!(written.starts_with("POST /app.sgp HTTP/1.1\r\n"));
    assert!(written.contains("X-Trace: 1\r\n"));
    assert!(written.ends_with("\r\n\r\nhello body"));
}

#[test]
fn test_chunked_response() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n"),
        bytes("3\r\nABC"),
        Read::WouldBlock,
        bytes("\r\n3\r\nDEF\r\n0\r\n\r\n"),
    ]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(completed(&events[0]).body, b"ABCDEF");
}

#[test]
fn test_close_delimited_response() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes("HTTP/1.0 200 OK\r\n\r\nABC"), bytes("DEF"), Read::Close]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(completed(&events[0]).body, b"ABCDEF");
}

#[test]
fn test_informational_response_is_skipped() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![
        bytes("HTTP/1.1 100 Continue\r\n\r\n"),
        bytes("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"),
    ]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    let response = completed(&events[0]);
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"ok");
}

#[test]
fn test_progress_reports_received_bytes() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nAB"),
        Read::WouldBlock,
        bytes("CD"),
    ]);
    let mut engine = engine(connector);
    let handle = engine.start(get(URL));

    assert_eq!(engine.progress(handle).unwrap().received, 0);
    engine.poll();
    engine.poll();
    let progress = engine.progress(handle).unwrap();
    assert_eq!(progress.received, 2);
    assert_eq!(progress.expected, Some(4));
    assert_eq!(progress.fraction(), Some(0.5));

    run(&mut engine);
    assert!(engine.progress(handle).is_none());
}

#[test]
fn test_concurrent_requests_finish_independently() {
    let other = "http://mirror.test/other.sgp";
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n"),
        Read::WouldBlock,
        Read::WouldBlock,
        bytes("aa"),
    ]);
    connector.serve(other, vec![bytes("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nbb")]);
    let mut engine = engine(connector);
    let slow = engine.start(get(URL));
    let fast = engine.start(get(other));

    let (events, _) = run(&mut engine);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id(), fast.id());
    assert!(engine.is_active(slow));

    let (events, _) = run(&mut engine);
    assert_eq!(events[0].id(), slow.id());
    assert_eq!(completed(&events[0]).body, b"aa");
}

// ---------------------------------------------------------------------------
// Redirects
// ---------------------------------------------------------------------------

#[test]
fn test_redirect_is_followed() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes(
        "HTTP/1.1 302 Found\r\nLocation: /v2/app.sgp\r\nContent-Length: 0\r\n\r\n",
    )]);
    let target = connector.serve("http://packages.test/v2/app.sgp", vec![bytes(
        "HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nnew",
    )]);
    let connects = Arc::clone(&connector.connects);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    let response = completed(&events[0]);
    assert_eq!(response.body, b"new");
    assert_eq!(response.final_url.as_str(), "http://packages.test/v2/app.sgp");
    assert!(target.written().starts_with("GET /v2/app.sgp HTTP/1.1\r\n"));
    assert_eq!(connects.lock().unwrap().len(), 2);
}

#[test]
fn test_see_other_turns_post_into_get() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes(
        "HTTP/1.1 303 See Other\r\nLocation: http://cdn.test/result\r\n\r\n",
    )]);
    let target = connector.serve("http://cdn.test/result", vec![bytes(
        "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
    )]);
    let mut engine = engine(connector);
    engine.start(DownloadRequest::post(Url::parse(URL).unwrap(), b"q".to_vec()));

    run(&mut engine);
    let written = target.written();
    assert!(written.starts_with("GET /result HTTP/1.1\r\n"));
    assert!(!written.contains("Content-Length"));
}

#[test]
fn test_redirect_limit() {
    let mut connector = FakeConnector::default();
    for _ in 0..4 {
        connector.serve(URL, vec![bytes(
            "HTTP/1.1 301 Moved Permanently\r\nLocation: /app.sgp\r\n\r\n",
        )]);
    }
    let config = EngineConfig {
        max_redirects: 2,
        ..EngineConfig::default()
    };
    let mut engine = DownloadEngine::new(Box::new(connector), config);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(
        failed(&events[0]),
        &DownloadError::TooManyRedirects { limit: 2 }
    );
}

#[test]
fn test_redirect_without_location_fails() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes("HTTP/1.1 302 Found\r\n\r\n")]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(
        failed(&events[0]),
        &DownloadError::UnexpectedStatus { status: 302 }
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

fn fail_with(head: &str) -> DownloadError {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes(head)]);
    let mut engine = engine(connector);
    engine.start(get(URL));
    let (events, _) = run(&mut engine);
    failed(&events[0]).clone()
}

#[test]
fn test_status_mapping() {
    assert_eq!(
        fail_with("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n"),
        DownloadError::NotFound {
            url: URL.to_string()
        }
    );
    assert!(matches!(
        fail_with("HTTP/1.1 410 Gone\r\n\r\n"),
        DownloadError::NotFound { .. }
    ));
    assert_eq!(
        fail_with("HTTP/1.1 503 Service Unavailable\r\n\r\n"),
        DownloadError::ServerError { status: 503 }
    );
    assert_eq!(
        fail_with("HTTP/1.1 403 Forbidden\r\n\r\n"),
        DownloadError::UnexpectedStatus { status: 403 }
    );
    assert!(matches!(
        fail_with("garbage\r\n\r\n"),
        DownloadError::MalformedResponse(_)
    ));
}

#[test]
fn test_connect_failure_reported_on_poll() {
    let mut engine = engine(FakeConnector::default());
    let handle = engine.start(get(URL));
    assert!(engine.is_active(handle));

    let events = engine.poll();
    assert_eq!(events.len(), 1);
    assert!(matches!(failed(&events[0]), DownloadError::NetworkFailure(_)));
    assert!(!engine.is_active(handle));
}

#[test]
fn test_connection_closed_mid_body() {
    let mut connector = FakeConnector::default();
    let wire = connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort"),
        Read::Close,
    ]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert!(matches!(failed(&events[0]), DownloadError::NetworkFailure(_)));
    assert_eq!(wire.closes(), 1);
}

#[test]
fn test_read_error_fails_request() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![Read::Error("connection reset")]);
    let mut engine = engine(connector);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(
        failed(&events[0]),
        &DownloadError::NetworkFailure("connection reset".into())
    );
}

#[test]
fn test_declared_length_over_limit() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![bytes("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n")]);
    let config = EngineConfig {
        max_body_bytes: 10,
        ..EngineConfig::default()
    };
    let mut engine = DownloadEngine::new(Box::new(connector), config);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(failed(&events[0]), &DownloadError::TooLarge { limit: 10 });
}

#[test]
fn test_streamed_body_over_limit() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![
        bytes("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n"),
        bytes("8\r\n01234567\r\n"),
        bytes("8\r\n01234567\r\n"),
    ]);
    let config = EngineConfig {
        max_body_bytes: 10,
        ..EngineConfig::default()
    };
    let mut engine = DownloadEngine::new(Box::new(connector), config);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert_eq!(failed(&events[0]), &DownloadError::TooLarge { limit: 10 });
}

#[test]
fn test_idle_timeout() {
    let mut connector = FakeConnector::default();
    connector.serve(URL, vec![Read::WouldBlock]);
    let config = EngineConfig {
        idle_timeout: Some(Duration::ZERO),
        ..EngineConfig::default()
    };
    let mut engine = DownloadEngine::new(Box::new(connector), config);
    engine.start(get(URL));

    let (events, _) = run(&mut engine);
    assert!(matches!(failed(&events[0]), DownloadError::NetworkFailure(_)));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[test]
fn test_cancel_closes_transport_on_next_poll() {
    let mut connector = FakeConnector::default();
    let wire = connector.serve(URL, vec![Read::WouldBlock, Read::WouldBlock]);
    let mut engine = engine(connector);
    let handle = engine.start(get(URL));
    engine.poll();

    assert!(engine.cancel(handle));
    assert!(!engine.is_active(handle));
    assert_eq!(wire.closes(), 0);

    assert!(engine.poll().is_empty());
    assert_eq!(wire.closes(), 1);
    assert!(engine.poll().is_empty());
    assert_eq!(wire.closes(), 1);

    assert!(!engine.cancel(handle));
}

#[test]
fn test_drop_closes_active_transports() {
    let mut connector = FakeConnector::default();
    let wire = connector.serve(URL, vec![Read::WouldBlock]);
    let mut engine = engine(connector);
    engine.start(get(URL));
    engine.poll();

    drop(engine);
    assert_eq!(wire.closes(), 1);
}
