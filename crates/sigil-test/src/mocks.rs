//! Mock implementations of the runtime's collaborator traits.
//!
//! Every mock is a cheap `Clone` handle over shared state, so a test keeps
//! one copy for assertions and hands another to the code under test.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sigil_approval::{Decision, TrustDecisionSurface};
use sigil_crypto::{Certificate, ChainVerification, TrustStore, TrustStoreError};
use sigil_download::{Connector, ReadOutcome, Transport, TransportError, WriteOutcome};
use sigil_runtime::{
    AppRuntime, ExitNotifier, LaunchRequest, ProcessHandle, RuntimeError, RuntimeResult,
};
use sigil_trust::VerifyVerdict;
use url::Url;

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

/// One scripted answer to a `try_read` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    /// Deliver these bytes. A step larger than the caller's buffer is split
    /// across reads.
    Data(Vec<u8>),
    /// Nothing available yet.
    WouldBlock,
    /// The peer closes the stream.
    Close,
    /// The stream fails.
    Fail(String),
}

impl ScriptStep {
    /// Data step from anything byte-like.
    #[must_use]
    pub fn data(bytes: impl AsRef<[u8]>) -> Self {
        Self::Data(bytes.as_ref().to_vec())
    }
}

/// A simulated non-blocking socket that replays a script.
///
/// Writes are accepted in full and captured. Reads follow the script; once
/// it runs out the stream reports `Closed`.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: VecDeque<ScriptStep>,
    connect_polls: usize,
    written: Arc<Mutex<Vec<u8>>>,
    closed: Arc<AtomicBool>,
}

impl ScriptedTransport {
    /// Create a transport that replays `script`.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            script: script.into_iter().collect(),
            connect_polls: 0,
            written: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report "not writable" for the first `polls` writability checks, as a
    /// connection still being established would.
    #[must_use]
    pub fn with_connect_delay(mut self, polls: usize) -> Self {
        self.connect_polls = polls;
        self
    }

    /// Shared view of every byte written so far.
    #[must_use]
    pub fn written_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    /// Shared flag set once the transport is closed.
    #[must_use]
    pub fn closed_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Transport for ScriptedTransport {
    fn is_writable(&mut self) -> bool {
        if self.connect_polls > 0 {
            self.connect_polls = self.connect_polls.saturating_sub(1);
            return false;
        }
        true
    }

    fn try_write(&mut self, buf: &[u8]) -> WriteOutcome {
        if let Ok(mut guard) = self.written.lock() {
            guard.extend_from_slice(buf);
        }
        WriteOutcome::Written(buf.len())
    }

    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        match self.script.pop_front() {
            None | Some(ScriptStep::Close) => ReadOutcome::Closed,
            Some(ScriptStep::WouldBlock) => ReadOutcome::WouldBlock,
            Some(ScriptStep::Fail(msg)) => ReadOutcome::Error(msg),
            Some(ScriptStep::Data(mut bytes)) => {
                if bytes.is_empty() {
                    return ReadOutcome::WouldBlock;
                }
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    let rest = bytes.split_off(n);
                    self.script.push_front(ScriptStep::Data(rest));
                }
                ReadOutcome::Data(n)
            },
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// ScriptedConnector
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ConnectorState {
    scripts: HashMap<String, VecDeque<Vec<ScriptStep>>>,
    connects: Vec<String>,
    written: Vec<Arc<Mutex<Vec<u8>>>>,
    closed: Vec<Arc<AtomicBool>>,
}

/// Hands out [`ScriptedTransport`]s by URL.
///
/// Each connection to a URL consumes the next queued script for it, so
/// retries can see different answers. A URL with nothing queued fails to
/// connect.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
    connect_delay: usize,
}

impl ScriptedConnector {
    /// Create a connector with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `script` for the next connection to `url`.
    #[must_use]
    pub fn with_script(self, url: &str, script: Vec<ScriptStep>) -> Self {
        self.queue(url, script);
        self
    }

    /// Queue a complete response delivered in one read.
    #[must_use]
    pub fn with_response(self, url: &str, response: Vec<u8>) -> Self {
        self.queue(url, vec![ScriptStep::Data(response)]);
        self
    }

    /// Make every transport report "not writable" for `polls` checks.
    #[must_use]
    pub fn with_connect_delay(mut self, polls: usize) -> Self {
        self.connect_delay = polls;
        self
    }

    /// Queue `script` for the next connection to `url`.
    pub fn queue(&self, url: &str, script: Vec<ScriptStep>) {
        if let Ok(mut guard) = self.state.lock() {
            guard
                .scripts
                .entry(url.to_string())
                .or_default()
                .push_back(script);
        }
    }

    /// URLs connected to, in order.
    #[must_use]
    pub fn connects(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|g| g.connects.clone())
            .unwrap_or_default()
    }

    /// Bytes written on the `index`-th connection.
    #[must_use]
    pub fn written(&self, index: usize) -> Vec<u8> {
        self.state
            .lock()
            .ok()
            .and_then(|g| g.written.get(index).cloned())
            .and_then(|w| w.lock().map(|b| b.clone()).ok())
            .unwrap_or_default()
    }

    /// Whether the `index`-th connection has been closed.
    #[must_use]
    pub fn closed(&self, index: usize) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|g| g.closed.get(index).map(|c| c.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&mut self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| TransportError::Connect("connector state poisoned".to_string()))?;
        guard.connects.push(url.to_string());

        let script = guard
            .scripts
            .get_mut(url.as_str())
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::Connect(format!("no script for {url}")))?;

        let transport = ScriptedTransport::new(script).with_connect_delay(self.connect_delay);
        guard.written.push(transport.written_handle());
        guard.closed.push(transport.closed_handle());
        Ok(Box::new(transport))
    }
}

// ---------------------------------------------------------------------------
// CountingTrustStore
// ---------------------------------------------------------------------------

/// Wraps a trust store and counts `verify` calls.
#[derive(Clone)]
pub struct CountingTrustStore {
    inner: Arc<dyn TrustStore>,
    calls: Arc<AtomicUsize>,
}

impl CountingTrustStore {
    /// Count calls made to `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn TrustStore>) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `verify` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CountingTrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingTrustStore")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl TrustStore for CountingTrustStore {
    fn verify(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
    ) -> Result<ChainVerification, TrustStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(leaf, intermediates)
    }
}

// ---------------------------------------------------------------------------
// RecordingSurface
// ---------------------------------------------------------------------------

/// Trust decision surface that answers from a queue and records prompts.
///
/// Answers [`Decision::Cancel`] once the queue is empty unless a different
/// default is set.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    decisions: Arc<Mutex<VecDeque<Decision>>>,
    presented: Arc<Mutex<Vec<(VerifyVerdict, String)>>>,
    dismissals: Arc<AtomicUsize>,
    default_decision: Decision,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSurface {
    /// Create a surface with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decisions: Arc::new(Mutex::new(VecDeque::new())),
            presented: Arc::new(Mutex::new(Vec::new())),
            dismissals: Arc::new(AtomicUsize::new(0)),
            default_decision: Decision::Cancel,
        }
    }

    /// Queue a decision.
    #[must_use]
    pub fn with_decision(self, decision: Decision) -> Self {
        self.queue(decision);
        self
    }

    /// Answer `decision` whenever the queue is empty.
    #[must_use]
    pub fn with_default_decision(mut self, decision: Decision) -> Self {
        self.default_decision = decision;
        self
    }

    /// Queue a decision.
    pub fn queue(&self, decision: Decision) {
        if let Ok(mut guard) = self.decisions.lock() {
            guard.push_back(decision);
        }
    }

    /// Every `(verdict, signer)` presented, in order.
    #[must_use]
    pub fn presented(&self) -> Vec<(VerifyVerdict, String)> {
        self.presented
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Number of `present` calls.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.presented.lock().map(|g| g.len()).unwrap_or_default()
    }

    /// Number of `dismiss` calls.
    #[must_use]
    pub fn dismiss_count(&self) -> usize {
        self.dismissals.load(Ordering::SeqCst)
    }
}

impl TrustDecisionSurface for RecordingSurface {
    fn present(&mut self, verdict: VerifyVerdict, signer_name: &str) -> Decision {
        if let Ok(mut guard) = self.presented.lock() {
            guard.push((verdict, signer_name.to_string()));
        }
        self.decisions
            .lock()
            .ok()
            .and_then(|mut g| g.pop_front())
            .unwrap_or(self.default_decision)
    }

    fn dismiss(&mut self) {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockAppRuntime
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RuntimeState {
    launches: Vec<(ProcessHandle, LaunchRequest, ExitNotifier)>,
    terminated: Vec<ProcessHandle>,
    next: u64,
}

/// Application runtime that records launches instead of running anything.
///
/// Tests end a "process" with [`exit`](Self::exit).
#[derive(Debug, Clone, Default)]
pub struct MockAppRuntime {
    state: Arc<Mutex<RuntimeState>>,
    refuse: Arc<AtomicBool>,
}

impl MockAppRuntime {
    /// Create a runtime with no launches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later launch fail.
    pub fn refuse_launches(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of launches so far.
    #[must_use]
    pub fn launch_count(&self) -> usize {
        self.state.lock().map(|g| g.launches.len()).unwrap_or_default()
    }

    /// Every launch request, in order.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.state
            .lock()
            .map(|g| g.launches.iter().map(|(_, r, _)| r.clone()).collect())
            .unwrap_or_default()
    }

    /// Handles passed to `terminate`, in order.
    #[must_use]
    pub fn terminated(&self) -> Vec<ProcessHandle> {
        self.state
            .lock()
            .map(|g| g.terminated.clone())
            .unwrap_or_default()
    }

    /// Report that the `index`-th launched process exited with `code`.
    ///
    /// Returns `false` if there is no such launch.
    pub fn exit(&self, index: usize, code: Option<i32>) -> bool {
        let Ok(guard) = self.state.lock() else {
            return false;
        };
        match guard.launches.get(index) {
            Some((handle, _, notifier)) => {
                notifier.exited(*handle, code);
                true
            },
            None => false,
        }
    }
}

impl AppRuntime for MockAppRuntime {
    fn launch(
        &mut self,
        request: LaunchRequest,
        on_exit: ExitNotifier,
    ) -> RuntimeResult<ProcessHandle> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RuntimeError::Launch("launch refused by test".to_string()));
        }
        let mut guard = self
            .state
            .lock()
            .map_err(|_| RuntimeError::Launch("runtime state poisoned".to_string()))?;
        guard.next = guard.next.saturating_add(1);
        let handle = ProcessHandle::new(guard.next);
        guard.launches.push((handle, request, on_exit));
        Ok(handle)
    }

    fn terminate(&mut self, handle: ProcessHandle) {
        if let Ok(mut guard) = self.state.lock() {
            guard.terminated.push(handle);
        }
    }
}
