//! The poll-driven download engine.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use url::Url;

use crate::error::DownloadError;
use crate::http::{self, BodyDecoder, ResponseHead};
use crate::request::{DownloadHandle, DownloadProgress, DownloadRequest, RequestId};
use crate::transport::{Connector, ReadOutcome, Transport, WriteOutcome};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sent as `User-Agent`.
    pub user_agent: String,
    /// Largest response body accepted.
    pub max_body_bytes: u64,
    /// Fail a request that makes no progress for this long. `None` disables.
    pub idle_timeout: Option<Duration>,
    /// Redirects followed before giving up.
    pub max_redirects: u32,
    /// Size of the buffer handed to each read.
    pub read_chunk_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("sigil/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 512 * 1024 * 1024,
            idle_timeout: Some(Duration::from_secs(30)),
            max_redirects: 5,
            read_chunk_bytes: 16 * 1024,
        }
    }
}

/// A completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResponse {
    /// Final status code.
    pub status: u16,
    /// Final response headers.
    pub headers: Vec<(String, String)>,
    /// Decoded body.
    pub body: Vec<u8>,
    /// URL the body came from, after redirects.
    pub final_url: Url,
}

impl DownloadResponse {
    /// First header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Terminal outcome of a request, reported exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// The body was received in full.
    Completed {
        /// Request that finished.
        id: RequestId,
        /// The response.
        response: DownloadResponse,
    },
    /// The request failed.
    Failed {
        /// Request that failed.
        id: RequestId,
        /// Why.
        error: DownloadError,
    },
}

impl DownloadEvent {
    /// Request this event belongs to.
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Completed { id, .. } | Self::Failed { id, .. } => *id,
        }
    }
}

enum Phase {
    Sending {
        bytes: Vec<u8>,
        written: usize,
    },
    Head {
        buf: Vec<u8>,
    },
    Body {
        head: ResponseHead,
        decoder: BodyDecoder,
        body: Vec<u8>,
    },
    Finished,
}

enum Step {
    Pending,
    Done(DownloadResponse),
    Fail(DownloadError),
    Redirect { location: Url, status: u16 },
}

struct InFlight {
    request: DownloadRequest,
    transport: Option<Box<dyn Transport>>,
    phase: Phase,
    redirects: u32,
    last_activity: Instant,
    pending_error: Option<DownloadError>,
    received: u64,
    expected: Option<u64>,
}

impl InFlight {
    fn new(request: DownloadRequest) -> Self {
        Self {
            request,
            transport: None,
            phase: Phase::Finished,
            redirects: 0,
            last_activity: Instant::now(),
            pending_error: None,
            received: 0,
            expected: None,
        }
    }

    /// Open a transport for the current URL and queue the request bytes.
    /// A connect error is held until the next poll.
    fn connect(&mut self, connector: &mut dyn Connector, config: &EngineConfig) {
        self.received = 0;
        self.expected = None;
        self.last_activity = Instant::now();

        match connector.connect(&self.request.url) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.phase = Phase::Sending {
                    bytes: http::encode_request(
                        &self.request.url,
                        self.request.body.as_deref(),
                        &self.request.headers,
                        &config.user_agent,
                    ),
                    written: 0,
                };
            },
            Err(err) => {
                self.phase = Phase::Finished;
                self.pending_error = Some(err.into());
            },
        }
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    /// Perform at most one read or write.
    fn step(&mut self, config: &EngineConfig, scratch: &mut [u8]) -> Step {
        if let Some(err) = self.pending_error.take() {
            return Step::Fail(err);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Step::Fail(DownloadError::NetworkFailure(
                "request has no transport".into(),
            ));
        };

        if let Phase::Sending { bytes, written } = &mut self.phase {
            if !transport.is_writable() {
                return idle_step(self.last_activity, config);
            }
            return match transport.try_write(&bytes[*written..]) {
                WriteOutcome::Written(0) | WriteOutcome::WouldBlock => {
                    idle_step(self.last_activity, config)
                },
                WriteOutcome::Written(n) => {
                    *written = written.saturating_add(n).min(bytes.len());
                    self.last_activity = Instant::now();
                    if *written == bytes.len() {
                        self.phase = Phase::Head { buf: Vec::new() };
                    }
                    Step::Pending
                },
                WriteOutcome::Error(msg) => Step::Fail(DownloadError::NetworkFailure(msg)),
            };
        }

        let n = match transport.try_read(scratch) {
            ReadOutcome::Data(0) | ReadOutcome::WouldBlock => {
                return idle_step(self.last_activity, config);
            },
            ReadOutcome::Data(n) => n.min(scratch.len()),
            ReadOutcome::Closed => return self.on_close(),
            ReadOutcome::Error(msg) => return Step::Fail(DownloadError::NetworkFailure(msg)),
        };
        self.last_activity = Instant::now();
        self.on_data(&scratch[..n], config)
    }

    fn on_data(&mut self, data: &[u8], config: &EngineConfig) -> Step {
        if !matches!(self.phase, Phase::Head { .. }) {
            return self.feed_body(data, config);
        }
        let Phase::Head { buf } = &mut self.phase else {
            return Step::Pending;
        };

        buf.extend_from_slice(data);
        loop {
            let (head, consumed) = match http::parse_head(buf) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => return Step::Pending,
                Err(err) => return Step::Fail(err),
            };
            buf.drain(..consumed);
            if head.is_informational() {
                continue;
            }
            let leftover = std::mem::take(buf);
            return self.on_head(head, &leftover, config);
        }
    }

    fn on_head(&mut self, head: ResponseHead, leftover: &[u8], config: &EngineConfig) -> Step {
        match head.status {
            200..=299 => {},
            301 | 302 | 303 | 307 | 308 => {
                let Some(location) = head.header("location") else {
                    return Step::Fail(DownloadError::UnexpectedStatus {
                        status: head.status,
                    });
                };
                return match self.request.url.join(location) {
                    Ok(location) => Step::Redirect {
                        location,
                        status: head.status,
                    },
                    Err(_) => Step::Fail(DownloadError::MalformedResponse(format!(
                        "bad Location {location:?}"
                    ))),
                };
            },
            404 | 410 => {
                return Step::Fail(DownloadError::NotFound {
                    url: self.request.url.to_string(),
                });
            },
            500..=599 => {
                return Step::Fail(DownloadError::ServerError {
                    status: head.status,
                });
            },
            status => return Step::Fail(DownloadError::UnexpectedStatus { status }),
        }

        let decoder = match BodyDecoder::for_head(&head) {
            Ok(decoder) => decoder,
            Err(err) => return Step::Fail(err),
        };
        self.expected = BodyDecoder::expected_len(&head);
        if self.expected.is_some_and(|len| len > config.max_body_bytes) {
            return Step::Fail(DownloadError::TooLarge {
                limit: config.max_body_bytes,
            });
        }

        self.phase = Phase::Body {
            head,
            decoder,
            body: Vec::new(),
        };
        self.feed_body(leftover, config)
    }

    fn feed_body(&mut self, data: &[u8], config: &EngineConfig) -> Step {
        let Phase::Body { decoder, body, .. } = &mut self.phase else {
            return Step::Pending;
        };

        let done = match decoder.feed(data, body) {
            Ok(done) => done,
            Err(err) => return Step::Fail(err),
        };
        self.received = body.len() as u64;
        if self.received > config.max_body_bytes {
            return Step::Fail(DownloadError::TooLarge {
                limit: config.max_body_bytes,
            });
        }

        if done {
            self.finish()
        } else {
            Step::Pending
        }
    }

    fn on_close(&mut self) -> Step {
        let complete = match &self.phase {
            Phase::Body { decoder, .. } => decoder.finish_on_close(),
            Phase::Sending { .. } => Err(DownloadError::NetworkFailure(
                "connection closed while sending request".into(),
            )),
            Phase::Head { .. } => Err(DownloadError::NetworkFailure(
                "connection closed before response head".into(),
            )),
            Phase::Finished => Err(DownloadError::NetworkFailure("connection closed".into())),
        };
        match complete {
            Ok(()) => self.finish(),
            Err(err) => Step::Fail(err),
        }
    }

    fn finish(&mut self) -> Step {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Body { head, body, .. } => Step::Done(DownloadResponse {
                status: head.status,
                headers: head.headers,
                body,
                final_url: self.request.url.clone(),
            }),
            _ => Step::Fail(DownloadError::NetworkFailure(
                "no response to complete".into(),
            )),
        }
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            received: self.received,
            expected: self.expected,
        }
    }
}

fn idle_step(last_activity: Instant, config: &EngineConfig) -> Step {
    match config.idle_timeout {
        Some(limit) if last_activity.elapsed() >= limit => Step::Fail(
            DownloadError::NetworkFailure(format!("no progress for {}ms", limit.as_millis())),
        ),
        _ => Step::Pending,
    }
}

/// Drives any number of concurrent downloads from a single thread.
///
/// Nothing happens between calls to [`poll`](Self::poll).
pub struct DownloadEngine {
    connector: Box<dyn Connector>,
    config: EngineConfig,
    active: BTreeMap<RequestId, InFlight>,
    closing: Vec<Box<dyn Transport>>,
    scratch: Vec<u8>,
    next_id: u64,
}

impl fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("closing", &self.closing.len())
            .finish_non_exhaustive()
    }
}

impl DownloadEngine {
    /// Create an engine that opens transports through `connector`.
    #[must_use]
    pub fn new(connector: Box<dyn Connector>, config: EngineConfig) -> Self {
        let scratch = vec![0u8; config.read_chunk_bytes.max(1)];
        Self {
            connector,
            config,
            active: BTreeMap::new(),
            closing: Vec::new(),
            scratch,
            next_id: 1,
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Begin a request. Returns immediately; a connection that cannot be
    /// started is reported as a failure on the next poll.
    pub fn start(&mut self, request: DownloadRequest) -> DownloadHandle {
        let id = RequestId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);

        debug!(request = %id, url = %request.url, "Starting download");
        let mut inflight = InFlight::new(request);
        inflight.connect(self.connector.as_mut(), &self.config);
        self.active.insert(id, inflight);

        DownloadHandle { id }
    }

    /// Abandon a request. Its transport is closed on the next poll and no
    /// event is reported for it. Returns `false` if it was not active.
    pub fn cancel(&mut self, handle: DownloadHandle) -> bool {
        let Some(mut inflight) = self.active.remove(&handle.id) else {
            return false;
        };
        debug!(request = %handle.id, "Download cancelled");
        if let Some(transport) = inflight.transport.take() {
            self.closing.push(transport);
        }
        true
    }

    /// Whether the request is still in flight.
    #[must_use]
    pub fn is_active(&self, handle: DownloadHandle) -> bool {
        self.active.contains_key(&handle.id)
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Body bytes received so far for an active request.
    #[must_use]
    pub fn progress(&self, handle: DownloadHandle) -> Option<DownloadProgress> {
        self.active.get(&handle.id).map(InFlight::progress)
    }

    /// Advance every active request by at most one non-blocking operation
    /// and return the requests that finished.
    pub fn poll(&mut self) -> Vec<DownloadEvent> {
        for mut transport in self.closing.drain(..) {
            transport.close();
        }

        let mut events = Vec::new();
        let mut finished = Vec::new();

        for (&id, inflight) in &mut self.active {
            let outcome = match inflight.step(&self.config, &mut self.scratch) {
                Step::Pending => continue,
                Step::Redirect { location, status } => {
                    follow_redirect(
                        inflight,
                        self.connector.as_mut(),
                        &self.config,
                        location,
                        status,
                    );
                    match inflight.pending_error.take() {
                        Some(error) => Err(error),
                        None => {
                            debug!(request = %id, url = %inflight.request.url, "Following redirect");
                            continue;
                        },
                    }
                },
                Step::Done(response) => Ok(response),
                Step::Fail(error) => Err(error),
            };

            inflight.close_transport();
            finished.push(id);
            events.push(match outcome {
                Ok(response) => {
                    debug!(
                        request = %id,
                        status = response.status,
                        bytes = response.body.len(),
                        "Download complete"
                    );
                    DownloadEvent::Completed { id, response }
                },
                Err(error) => {
                    warn!(request = %id, url = %inflight.request.url, %error, "Download failed");
                    DownloadEvent::Failed { id, error }
                },
            });
        }

        for id in finished {
            self.active.remove(&id);
        }
        events
    }
}

impl Drop for DownloadEngine {
    fn drop(&mut self) {
        for mut transport in self.closing.drain(..) {
            transport.close();
        }
        for inflight in self.active.values_mut() {
            inflight.close_transport();
        }
    }
}

fn follow_redirect(
    inflight: &mut InFlight,
    connector: &mut dyn Connector,
    config: &EngineConfig,
    location: Url,
    status: u16,
) {
    inflight.close_transport();
    if inflight.redirects >= config.max_redirects {
        inflight.pending_error = Some(DownloadError::TooManyRedirects {
            limit: config.max_redirects,
        });
        return;
    }
    inflight.redirects = inflight.redirects.saturating_add(1);

    // 303 always becomes GET; 301/302 downgrade POST the way browsers do.
    if status == 303 || (matches!(status, 301 | 302) && inflight.request.body.is_some()) {
        inflight.request.body = None;
    }
    inflight.request.url = location;
    inflight.connect(connector, config);
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
