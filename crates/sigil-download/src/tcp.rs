//! Plain-HTTP transport over tokio's non-blocking TCP streams.

use std::fmt;
use std::io;

use futures::FutureExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::transport::{Connector, ReadOutcome, Transport, WriteOutcome};

/// Opens `http://` connections on a tokio runtime.
///
/// The connect itself runs as a task on the runtime; the returned transport
/// only ever inspects it without waiting. TLS is not provided.
#[derive(Clone)]
pub struct TokioConnector {
    handle: Handle,
}

impl fmt::Debug for TokioConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioConnector").finish_non_exhaustive()
    }
}

impl TokioConnector {
    /// Use the given runtime.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] outside a tokio runtime.
    pub fn current() -> Result<Self, TransportError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| TransportError::Connect(e.to_string()))
    }
}

impl Connector for TokioConnector {
    fn connect(&mut self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        if url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidTarget(format!("{url} has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| TransportError::InvalidTarget(format!("{url} has no port")))?;

        tracing::trace!(%host, port, "Connecting");
        let task = self
            .handle
            .spawn(async move { TcpStream::connect((host.as_str(), port)).await });

        Ok(Box::new(TcpTransport {
            state: State::Connecting(task),
        }))
    }
}

enum State {
    Connecting(JoinHandle<io::Result<TcpStream>>),
    Connected(TcpStream),
    Failed(String),
    Closed,
}

struct TcpTransport {
    state: State,
}

impl TcpTransport {
    /// Pick up the connect result if the task has finished.
    fn drive(&mut self) {
        let State::Connecting(task) = &mut self.state else {
            return;
        };
        if !task.is_finished() {
            return;
        }
        self.state = match task.now_or_never() {
            Some(Ok(Ok(stream))) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(error = %e, "Failed to set TCP_NODELAY");
                }
                State::Connected(stream)
            },
            Some(Ok(Err(e))) => State::Failed(e.to_string()),
            Some(Err(e)) => State::Failed(format!("connect task failed: {e}")),
            None => return,
        };
    }
}

impl Transport for TcpTransport {
    fn is_writable(&mut self) -> bool {
        self.drive();
        !matches!(self.state, State::Connecting(_))
    }

    fn try_write(&mut self, buf: &[u8]) -> WriteOutcome {
        self.drive();
        match &self.state {
            State::Connecting(_) => WriteOutcome::WouldBlock,
            State::Connected(stream) => match stream.try_write(buf) {
                Ok(n) => WriteOutcome::Written(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => WriteOutcome::WouldBlock,
                Err(e) => WriteOutcome::Error(e.to_string()),
            },
            State::Failed(msg) => WriteOutcome::Error(msg.clone()),
            State::Closed => WriteOutcome::Error("transport closed".into()),
        }
    }

    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome {
        self.drive();
        match &self.state {
            State::Connecting(_) => ReadOutcome::WouldBlock,
            State::Connected(stream) => match stream.try_read(buf) {
                Ok(0) => ReadOutcome::Closed,
                Ok(n) => ReadOutcome::Data(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
                Err(e) => ReadOutcome::Error(e.to_string()),
            },
            State::Failed(msg) => ReadOutcome::Error(msg.clone()),
            State::Closed => ReadOutcome::Closed,
        }
    }

    fn close(&mut self) {
        if let State::Connecting(task) = &self.state {
            task.abort();
        }
        self.state = State::Closed;
    }
}
