//! Contract with the application runtime that runs verified payloads.

use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use sigil_package::{PackageHandle, PackageManifest, PackageResult, PayloadEntry};
use sigil_trust::VerifyVerdict;
use tokio::sync::mpsc;

use crate::error::{RuntimeError, RuntimeResult};
use crate::instance::InstanceId;

/// Identifies a launched application within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    /// Wrap a runtime-assigned number.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The runtime-assigned number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Reports application exits back to the instance manager.
///
/// Cheap to clone and safe to move to other threads or tasks; exits are
/// picked up on the manager's next tick.
#[derive(Debug, Clone)]
pub struct ExitNotifier {
    tx: mpsc::UnboundedSender<(ProcessHandle, Option<i32>)>,
}

impl ExitNotifier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<(ProcessHandle, Option<i32>)>) -> Self {
        Self { tx }
    }

    /// Report that `handle` exited. `None` when no exit code is available
    /// (killed by a signal, for instance).
    pub fn exited(&self, handle: ProcessHandle, exit_code: Option<i32>) {
        // The manager may already be gone; nothing left to notify.
        let _ = self.tx.send((handle, exit_code));
    }
}

/// Snapshot of a package's bytes, taken once before verification.
///
/// Verification and launch both read this snapshot, so a source that
/// changes afterwards cannot alter what runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePayload(Arc<[u8]>);

impl PackagePayload {
    /// Wrap bytes already in memory.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Read the package that starts `offset` bytes into `path`, up to
    /// `limit` bytes.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::Io`] if the file cannot be read
    /// - [`RuntimeError::TooLarge`] if more than `limit` bytes follow `offset`
    pub fn read_file(path: &Path, offset: u64, limit: u64) -> RuntimeResult<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut bytes = Vec::new();
        file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
        if bytes.len() as u64 > limit {
            return Err(RuntimeError::TooLarge { limit });
        }
        Ok(Self(bytes.into()))
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Open the package for reading.
    ///
    /// # Errors
    ///
    /// Returns a [`PackageError`](sigil_package::PackageError) if the bytes
    /// are not a valid package.
    pub fn open(&self) -> PackageResult<PackageHandle<Cursor<Arc<[u8]>>>> {
        sigil_package::open(Cursor::new(Arc::clone(&self.0)))
    }
}

/// Everything an application runtime needs to start a verified package.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Instance being launched.
    pub instance: InstanceId,
    /// The package, already verified.
    pub payload: PackagePayload,
    /// Payload entries, in table-of-contents order.
    pub entries: Vec<PayloadEntry>,
    /// Parsed `package.toml`, if the package has one.
    pub manifest: Option<PackageManifest>,
    /// Extra arguments from the launch request.
    pub args: Vec<String>,
    /// Verdict the launch was approved under.
    pub verdict: VerifyVerdict,
    /// Signer common name.
    pub signer: String,
}

/// Runs verified payloads.
///
/// Implementations must return from [`launch`](Self::launch) without
/// waiting for the application, and report its exit through the given
/// [`ExitNotifier`].
pub trait AppRuntime: Send {
    /// Start the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be started; the instance then
    /// fails with [`FailureReason::LaunchFailed`](crate::FailureReason::LaunchFailed).
    fn launch(&mut self, request: LaunchRequest, on_exit: ExitNotifier)
    -> RuntimeResult<ProcessHandle>;

    /// Stop a running application. Must not block; unknown handles are
    /// ignored.
    fn terminate(&mut self, handle: ProcessHandle);
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_memory_payload_reopens() {
        let bytes = sigil_package::PackageWriter::new()
            .add_entry("a.txt", b"alpha".to_vec())
            .finish()
            .unwrap();
        let payload = PackagePayload::new(bytes);

        for _ in 0..2 {
            let mut package = payload.open().unwrap();
            let entry = package.find_entry("a.txt").unwrap().unwrap();
            assert_eq!(package.read_entry(&entry).unwrap(), b"alpha");
        }
    }

    #[test]
    fn test_missing_file_payload() {
        let result = PackagePayload::read_file(Path::new("/nonexistent/sigil/package.sgp"), 0, 1024);
        assert!(matches!(result, Err(RuntimeError::Io(_))));
    }

    #[test]
    fn test_file_payload_is_a_snapshot() {
        let bytes = sigil_package::PackageWriter::new()
            .add_entry("a.txt", b"alpha".to_vec())
            .finish()
            .unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"prefix").unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();

        let payload = PackagePayload::read_file(file.path(), 6, 1 << 20).unwrap();
        assert_eq!(payload.len(), bytes.len());

        std::fs::write(file.path(), b"replaced").unwrap();
        let mut package = payload.open().unwrap();
        let entry = package.find_entry("a.txt").unwrap().unwrap();
        assert_eq!(package.read_entry(&entry).unwrap(), b"alpha");
    }

    #[test]
    fn test_file_payload_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        file.flush().unwrap();

        let result = PackagePayload::read_file(file.path(), 0, 63);
        assert!(matches!(result, Err(RuntimeError::TooLarge { limit: 63 })));
        assert_eq!(PackagePayload::read_file(file.path(), 0, 64).unwrap().len(), 64);
    }

    #[test]
    fn test_exit_notifier_survives_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ExitNotifier::new(tx).exited(ProcessHandle::new(1), Some(0));
    }
}
