//! Transport contract consumed by the engine.

use url::Url;

use crate::error::TransportError;

/// Result of a non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were written into the buffer.
    Data(usize),
    /// Nothing available right now.
    WouldBlock,
    /// The peer closed the stream.
    Closed,
    /// The stream failed.
    Error(String),
}

/// Result of a non-blocking write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This many bytes were accepted.
    Written(usize),
    /// The stream cannot accept bytes right now.
    WouldBlock,
    /// The stream failed.
    Error(String),
}

/// A non-blocking byte stream (socket, TLS session, test double).
pub trait Transport: Send {
    /// Whether a write would make progress now. Also drives any pending
    /// connection setup.
    fn is_writable(&mut self) -> bool;

    /// Attempt to write without blocking.
    fn try_write(&mut self, buf: &[u8]) -> WriteOutcome;

    /// Attempt to read without blocking.
    fn try_read(&mut self, buf: &mut [u8]) -> ReadOutcome;

    /// Release the stream. Called once; must not block.
    fn close(&mut self);
}

/// Opens transports for URLs.
pub trait Connector: Send {
    /// Start connecting to `url`. Must return without waiting for the
    /// connection to complete.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no connection can even be attempted.
    fn connect(&mut self, url: &Url) -> Result<Box<dyn Transport>, TransportError>;
}
