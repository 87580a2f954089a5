//! Application runtime that extracts a package and runs its entrypoint as a
//! child process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::app::{AppRuntime, ExitNotifier, LaunchRequest, ProcessHandle};
use crate::error::{RuntimeError, RuntimeResult};

/// Runs packages as local processes.
///
/// Each launch extracts the payload into a fresh temporary directory,
/// starts the manifest's entrypoint there, and removes the directory once
/// the process exits.
#[derive(Debug)]
pub struct ProcessRuntime {
    runtime: Handle,
    work_dir: Option<PathBuf>,
    inherit_stdio: bool,
    next_handle: u64,
    kills: HashMap<ProcessHandle, oneshot::Sender<()>>,
}

impl ProcessRuntime {
    /// Runtime spawning on `runtime`, extracting into the system temp
    /// directory.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            work_dir: None,
            inherit_stdio: true,
            next_handle: 1,
            kills: HashMap::new(),
        }
    }

    /// Extract packages under `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Discard the child's output instead of sharing the host's terminal.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.inherit_stdio = false;
        self
    }

    fn extract(&self, request: &LaunchRequest) -> RuntimeResult<(tempfile::TempDir, PathBuf)> {
        let manifest = request
            .manifest
            .as_ref()
            .ok_or_else(|| RuntimeError::Launch("package has no package.toml".into()))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("sigil-");
        let dir = match &self.work_dir {
            Some(work_dir) => {
                fs::create_dir_all(work_dir)?;
                builder.tempdir_in(work_dir)?
            },
            None => builder.tempdir()?,
        };

        let mut package = request.payload.open()?;
        for entry in &request.entries {
            let relative = entry.relative_path().ok_or_else(|| {
                RuntimeError::Launch(format!("refusing to extract entry {:?}", entry.name))
            })?;
            let target = dir.path().join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(&target)?;
            package.copy_entry(entry, &mut file)?;
        }

        let entrypoint = request
            .entries
            .iter()
            .find(|e| e.name == manifest.launch.entrypoint)
            .and_then(sigil_package::PayloadEntry::relative_path)
            .ok_or_else(|| {
                RuntimeError::Launch(format!(
                    "entrypoint {:?} is not in the package",
                    manifest.launch.entrypoint
                ))
            })?;
        let program = dir.path().join(entrypoint);
        make_executable(&program)?;

        Ok((dir, program))
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> RuntimeResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> RuntimeResult<()> {
    Ok(())
}

impl AppRuntime for ProcessRuntime {
    fn launch(
        &mut self,
        request: LaunchRequest,
        on_exit: ExitNotifier,
    ) -> RuntimeResult<ProcessHandle> {
        self.kills.retain(|_, kill| !kill.is_closed());
        let (dir, program) = self.extract(&request)?;

        let mut args = request
            .manifest
            .as_ref()
            .map(|m| m.launch.args.clone())
            .unwrap_or_default();
        args.extend(request.args.iter().cloned());

        let mut command = Command::new(&program);
        command
            .args(&args)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if !self.inherit_stdio {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = {
            let _guard = self.runtime.enter();
            command
                .spawn()
                .map_err(|e| RuntimeError::Launch(format!("{}: {e}", program.display())))?
        };

        let handle = ProcessHandle::new(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        self.kills.insert(handle, kill_tx);

        info!(
            instance_id = %request.instance,
            process = %handle,
            pid = child.id(),
            program = %program.display(),
            "Application started"
        );

        self.runtime.spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!(process = %handle, error = %e, "Failed to kill application");
                    }
                    child.wait().await
                },
            };
            let exit_code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(process = %handle, error = %e, "Failed to wait for application");
                    None
                },
            };
            debug!(process = %handle, ?exit_code, "Application exited");
            drop(dir);
            on_exit.exited(handle, exit_code);
        });

        Ok(handle)
    }

    fn terminate(&mut self, handle: ProcessHandle) {
        if let Some(kill) = self.kills.remove(&handle) {
            debug!(process = %handle, "Terminating application");
            let _ = kill.send(());
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use sigil_package::{PackageWriter, PayloadEntry};
    use sigil_trust::VerifyVerdict;
    use tokio::sync::mpsc;

    use super::*;
    use crate::app::PackagePayload;
    use crate::instance::InstanceId;

    fn request(script: &str, manifest: &str) -> LaunchRequest {
        let bytes = PackageWriter::new()
            .add_entry("package.toml", manifest.as_bytes().to_vec())
            .add_entry("bin/run.sh", script.as_bytes().to_vec())
            .finish()
            .unwrap();
        let payload = PackagePayload::new(bytes);
        let mut package = payload.open().unwrap();
        let entries: Vec<PayloadEntry> = package
            .payload_entries()
            .collect::<Result<_, _>>()
            .unwrap();
        let manifest = package.manifest().unwrap();

        LaunchRequest {
            instance: InstanceId::new(),
            payload,
            entries,
            manifest,
            args: vec!["7".into()],
            verdict: VerifyVerdict::Verified,
            signer: "Example Signer".into(),
        }
    }

    const MANIFEST: &str = "[package]\nname = \"demo\"\nversion = \"1.0.0\"\n\n[launch]\nentrypoint = \"bin/run.sh\"\n";

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_exit_code_is_reported() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runtime = ProcessRuntime::new(Handle::current()).quiet();

        let handle = runtime
            .launch(request("#!/bin/sh\nexit \"$1\"\n", MANIFEST), ExitNotifier::new(tx))
            .unwrap();

        let (exited, code) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exited, handle);
        assert_eq!(code, Some(7));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_terminate_kills_process() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let work = tempfile::tempdir().unwrap();
        let mut runtime = ProcessRuntime::new(Handle::current())
            .with_work_dir(work.path())
            .quiet();

        let handle = runtime
            .launch(request("#!/bin/sh\nsleep 30\n", MANIFEST), ExitNotifier::new(tx))
            .unwrap();
        runtime.terminate(handle);
        runtime.terminate(handle);

        let (exited, code) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exited, handle);
        assert_eq!(code, None);

        // extraction directory is removed after exit
        assert_eq!(fs::read_dir(work.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_a_launch_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut runtime = ProcessRuntime::new(Handle::current()).quiet();
        let mut req = request("#!/bin/sh\n", MANIFEST);
        req.manifest = None;

        assert!(matches!(
            runtime.launch(req, ExitNotifier::new(tx)),
            Err(RuntimeError::Launch(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_entrypoint_is_a_launch_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut runtime = ProcessRuntime::new(Handle::current()).quiet();
        let manifest = MANIFEST.replace("bin/run.sh", "bin/missing");

        assert!(matches!(
            runtime.launch(request("#!/bin/sh\n", &manifest), ExitNotifier::new(tx)),
            Err(RuntimeError::Launch(_))
        ));
    }
}
