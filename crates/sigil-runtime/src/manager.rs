//! The instance manager.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use sigil_approval::{ApprovalRecord, ApprovalStore, Decision, TrustDecisionSurface};
use sigil_crypto::Certificate;
use sigil_download::{
    DownloadEngine, DownloadError, DownloadEvent, DownloadHandle, DownloadProgress, DownloadRequest,
    RequestId,
};
use sigil_package::{PackageManifest, PayloadEntry};
use sigil_trust::{TrustClassifier, VerifyVerdict};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{AppRuntime, ExitNotifier, LaunchRequest, PackagePayload, ProcessHandle};
use crate::error::{RuntimeError, RuntimeResult};
use crate::instance::{
    FailureReason, InstanceEvent, InstanceId, InstanceState, InstanceStatus, PackageSource,
    StreamResult,
};

/// Undrained events kept before the oldest are dropped.
pub const MAX_PENDING_EVENTS: usize = 1024;

/// States kept in an instance's history before the oldest are dropped.
pub const MAX_HISTORY: usize = 64;

#[derive(Default)]
struct StreamBuffer {
    bytes: Vec<u8>,
    outcome: Option<Result<(), DownloadError>>,
}

/// A package that has been opened and classified.
struct Verified {
    payload: PackagePayload,
    entries: Vec<PayloadEntry>,
    manifest: Option<PackageManifest>,
    verdict: VerifyVerdict,
    signer: String,
    leaf: Option<Certificate>,
}

struct Instance {
    id: InstanceId,
    source: PackageSource,
    args: Vec<String>,
    state: InstanceState,
    history: Vec<InstanceState>,
    failure: Option<FailureReason>,
    download: Option<DownloadHandle>,
    stream: Option<StreamBuffer>,
    payload: Option<PackagePayload>,
    verified: Option<Verified>,
    prompted: bool,
    approval: Option<ApprovalRecord>,
    process: Option<ProcessHandle>,
    exit_code: Option<i32>,
}

impl Instance {
    fn new(source: PackageSource, args: Vec<String>) -> Self {
        let stream = matches!(source, PackageSource::Stream).then(StreamBuffer::default);
        Self {
            id: InstanceId::new(),
            source,
            args,
            state: InstanceState::Created,
            history: vec![InstanceState::Created],
            failure: None,
            download: None,
            stream,
            payload: None,
            verified: None,
            prompted: false,
            approval: None,
            process: None,
            exit_code: None,
        }
    }

    fn transition(&mut self, to: InstanceState, events: &mut VecDeque<InstanceEvent>) {
        let from = self.state;
        self.state = to;
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(to);
        info!(instance_id = %self.id, %from, %to, "Instance state changed");
        if events.len() >= MAX_PENDING_EVENTS {
            events.pop_front();
            debug!(instance_id = %self.id, "Event queue full, oldest event dropped");
        }
        events.push_back(InstanceEvent::StateChanged {
            id: self.id,
            from,
            to,
        });
    }

    fn fail(&mut self, reason: FailureReason, events: &mut VecDeque<InstanceEvent>) {
        warn!(instance_id = %self.id, state = %self.state, reason = %reason, "Instance failed");
        self.failure = Some(reason);
        self.transition(InstanceState::Failed, events);
    }

    /// Forget everything learned since `Created`.
    fn reset(&mut self) {
        self.failure = None;
        self.download = None;
        self.stream = matches!(self.source, PackageSource::Stream).then(StreamBuffer::default);
        self.payload = None;
        self.verified = None;
        self.prompted = false;
        self.approval = None;
        self.process = None;
        self.exit_code = None;
    }

    /// Stream buffer still accepting bytes.
    fn open_stream(&mut self) -> Option<&mut StreamBuffer> {
        if !matches!(self.state, InstanceState::Created | InstanceState::Downloading) {
            return None;
        }
        self.stream.as_mut().filter(|s| s.outcome.is_none())
    }
}

/// Owns package instances and drives them from launch request to running
/// application.
///
/// The manager is single-threaded and cooperative: nothing happens between
/// calls to [`tick`](Self::tick), and each tick advances every instance by
/// at most one state transition. The only call that may block is the trust
/// surface's `present`.
///
/// The approval map is owned by exactly one manager.
pub struct InstanceManager {
    engine: DownloadEngine,
    classifier: TrustClassifier,
    surface: Box<dyn TrustDecisionSurface>,
    app_runtime: Box<dyn AppRuntime>,
    approvals: ApprovalStore,
    auto_approve_verified: bool,
    instances: HashMap<InstanceId, Instance>,
    order: Vec<InstanceId>,
    downloads: HashMap<RequestId, InstanceId>,
    processes: HashMap<ProcessHandle, InstanceId>,
    events: VecDeque<InstanceEvent>,
    exit_tx: mpsc::UnboundedSender<(ProcessHandle, Option<i32>)>,
    exit_rx: mpsc::UnboundedReceiver<(ProcessHandle, Option<i32>)>,
}

impl fmt::Debug for InstanceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceManager")
            .field("engine", &self.engine)
            .field("instances", &self.instances.len())
            .field("approvals", &self.approvals.len())
            .field("auto_approve_verified", &self.auto_approve_verified)
            .finish_non_exhaustive()
    }
}

impl InstanceManager {
    /// Create a manager with an empty approval map that auto-approves
    /// `Verified` chains.
    #[must_use]
    pub fn new(
        engine: DownloadEngine,
        classifier: TrustClassifier,
        surface: Box<dyn TrustDecisionSurface>,
        app_runtime: Box<dyn AppRuntime>,
    ) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            classifier,
            surface,
            app_runtime,
            approvals: ApprovalStore::new(),
            auto_approve_verified: true,
            instances: HashMap::new(),
            order: Vec::new(),
            downloads: HashMap::new(),
            processes: HashMap::new(),
            events: VecDeque::new(),
            exit_tx,
            exit_rx,
        }
    }

    /// Start from previously stored approvals.
    #[must_use]
    pub fn with_approvals(mut self, approvals: ApprovalStore) -> Self {
        self.approvals = approvals;
        self
    }

    /// Whether a `Verified` chain without a stored approval runs without
    /// asking.
    #[must_use]
    pub fn with_auto_approve_verified(mut self, enabled: bool) -> Self {
        self.auto_approve_verified = enabled;
        self
    }

    /// Stored approvals.
    #[must_use]
    pub fn approvals(&self) -> &ApprovalStore {
        &self.approvals
    }

    /// Stored approvals, for revocation.
    pub fn approvals_mut(&mut self) -> &mut ApprovalStore {
        &mut self.approvals
    }

    /// Create an instance. Nothing happens until the next tick.
    pub fn create_instance(&mut self, source: PackageSource, args: Vec<String>) -> InstanceId {
        let instance = Instance::new(source, args);
        let id = instance.id;
        info!(instance_id = %id, source = %instance.source, "Instance created");
        self.order.push(id);
        self.instances.insert(id, instance);
        id
    }

    /// Tear an instance down: cancel its download, dismiss a pending prompt,
    /// or terminate its application, then release it.
    ///
    /// Returns `false` if the instance does not exist (already deleted).
    pub fn delete_instance(&mut self, id: InstanceId) -> bool {
        let Some(mut instance) = self.instances.remove(&id) else {
            debug!(instance_id = %id, "Delete of unknown instance ignored");
            return false;
        };
        self.order.retain(|other| *other != id);

        if let Some(handle) = instance.download.take() {
            self.downloads.remove(&handle.id());
            self.engine.cancel(handle);
        }

        match instance.state {
            InstanceState::AwaitingApproval => {
                self.surface.dismiss();
                instance.fail(FailureReason::Dismissed, &mut self.events);
            },
            InstanceState::Running => {
                if let Some(process) = instance.process.take() {
                    self.processes.remove(&process);
                    self.app_runtime.terminate(process);
                }
                instance.transition(InstanceState::Stopped, &mut self.events);
            },
            _ => {},
        }

        info!(instance_id = %id, state = %instance.state, "Instance deleted");
        true
    }

    /// Advance everything by one step: poll the download engine, collect
    /// application exits, then give each remaining instance at most one
    /// transition.
    pub fn tick(&mut self) {
        let mut touched = HashSet::new();

        for event in self.engine.poll() {
            let Some(id) = self.downloads.remove(&event.id()) else {
                continue;
            };
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };
            instance.download = None;
            if instance.state != InstanceState::Downloading {
                continue;
            }
            match event {
                DownloadEvent::Completed { response, .. } => {
                    debug!(
                        instance_id = %id,
                        bytes = response.body.len(),
                        url = %response.final_url,
                        "Package downloaded"
                    );
                    instance.payload = Some(PackagePayload::new(response.body));
                    instance.transition(InstanceState::Verifying, &mut self.events);
                },
                DownloadEvent::Failed { error, .. } => {
                    instance.fail(FailureReason::Network(error), &mut self.events);
                },
            }
            touched.insert(id);
        }

        while let Ok((process, exit_code)) = self.exit_rx.try_recv() {
            let Some(id) = self.processes.remove(&process) else {
                continue;
            };
            let Some(instance) = self.instances.get_mut(&id) else {
                continue;
            };
            instance.process = None;
            instance.exit_code = exit_code;
            if instance.state == InstanceState::Running && touched.insert(id) {
                info!(instance_id = %id, ?exit_code, "Application exited");
                instance.transition(InstanceState::Stopped, &mut self.events);
            }
        }

        let order = self.order.clone();
        for id in order {
            if touched.contains(&id) {
                continue;
            }
            let Some(mut instance) = self.instances.remove(&id) else {
                continue;
            };
            self.advance(&mut instance);
            self.instances.insert(id, instance);
        }
    }

    fn advance(&mut self, instance: &mut Instance) {
        match instance.state {
            InstanceState::Created => self.begin(instance),
            InstanceState::Downloading => self.collect_stream(instance),
            InstanceState::Verifying => self.verify(instance),
            InstanceState::AwaitingApproval => self.request_approval(instance),
            InstanceState::Running | InstanceState::Stopped | InstanceState::Failed => {},
        }
    }

    fn begin(&mut self, instance: &mut Instance) {
        match &instance.source {
            PackageSource::Url(url) => {
                let handle = self.engine.start(DownloadRequest::get(url.clone()));
                self.downloads.insert(handle.id(), instance.id);
                instance.download = Some(handle);
                instance.transition(InstanceState::Downloading, &mut self.events);
            },
            PackageSource::Local { .. } => {
                instance.transition(InstanceState::Verifying, &mut self.events);
            },
            PackageSource::Stream => {
                instance.transition(InstanceState::Downloading, &mut self.events);
            },
        }
    }

    fn collect_stream(&mut self, instance: &mut Instance) {
        let Some(stream) = instance.stream.as_mut() else {
            return;
        };
        match stream.outcome.take() {
            None => {},
            Some(Ok(())) => {
                let bytes = std::mem::take(&mut stream.bytes);
                debug!(instance_id = %instance.id, bytes = bytes.len(), "Package stream complete");
                instance.payload = Some(PackagePayload::new(bytes));
                instance.transition(InstanceState::Verifying, &mut self.events);
            },
            Some(Err(error)) => {
                stream.bytes = Vec::new();
                instance.fail(FailureReason::Network(error), &mut self.events);
            },
        }
    }

    fn read_package(&self, payload: PackagePayload) -> RuntimeResult<Verified> {
        let mut package = payload.open()?;
        let classification = self.classifier.evaluate(package.certificate_chain());
        let entries = package.payload_entries().collect::<Result<Vec<_>, _>>()?;
        let manifest = package.manifest()?;

        Ok(Verified {
            payload,
            entries,
            manifest,
            verdict: classification.verdict,
            signer: classification.signer_name,
            leaf: classification.leaf,
        })
    }

    /// Snapshot of a local package. The file is read once, here; verification
    /// and launch both use the snapshot.
    fn read_local(&self, instance: &Instance) -> Option<RuntimeResult<PackagePayload>> {
        let PackageSource::Local { path, offset } = &instance.source else {
            return None;
        };
        let limit = self.engine.config().max_body_bytes;
        let payload = PackagePayload::read_file(path, *offset, limit);
        if let Ok(payload) = &payload {
            debug!(
                instance_id = %instance.id,
                path = %path.display(),
                bytes = payload.len(),
                "Package read from disk"
            );
        }
        Some(payload)
    }

    fn verify(&mut self, instance: &mut Instance) {
        let payload = match instance
            .payload
            .take()
            .map(Ok)
            .or_else(|| self.read_local(instance))
        {
            Some(Ok(payload)) => payload,
            Some(Err(e)) => {
                instance.fail(FailureReason::Container(e.to_string()), &mut self.events);
                return;
            },
            None => {
                instance.fail(
                    FailureReason::Container("no package data".into()),
                    &mut self.events,
                );
                return;
            },
        };

        let verified = match self.read_package(payload) {
            Ok(verified) => verified,
            Err(e) => {
                instance.fail(FailureReason::Container(e.to_string()), &mut self.events);
                return;
            },
        };
        let verdict = verified.verdict;
        let signer = verified.signer.clone();
        let leaf = verified.leaf.clone();
        instance.verified = Some(verified);

        if let Some(record) = self.approvals.covering(&signer, verdict).cloned() {
            debug!(instance_id = %instance.id, signer = %signer, %verdict, "Signer already approved");
            self.launch(instance, record);
        } else if verdict.is_verified() && self.auto_approve_verified {
            self.launch(instance, ApprovalRecord::automatic(signer, leaf));
        } else {
            instance.transition(InstanceState::AwaitingApproval, &mut self.events);
        }
    }

    fn request_approval(&mut self, instance: &mut Instance) {
        let Some(verified) = instance.verified.as_ref() else {
            instance.fail(
                FailureReason::Container("no verified package".into()),
                &mut self.events,
            );
            return;
        };
        let verdict = verified.verdict;
        let signer = verified.signer.clone();
        let leaf = verified.leaf.clone();

        // Another instance of the same signer may have been approved since.
        if let Some(record) = self.approvals.covering(&signer, verdict).cloned() {
            self.launch(instance, record);
            return;
        }
        if instance.prompted {
            return;
        }
        instance.prompted = true;

        info!(instance_id = %instance.id, signer = %signer, %verdict, "Requesting trust decision");
        match self.surface.present(verdict, &signer) {
            Decision::Approve => {
                let record = if self.surface.is_interactive() {
                    ApprovalRecord::interactive(signer, verdict, leaf)
                } else {
                    ApprovalRecord::by_policy(signer, verdict, leaf)
                };
                if record.authorizes_launch() && self.approvals.record(record.clone()) {
                    debug!(instance_id = %instance.id, signer = %record.signer, "Approval stored");
                }
                self.launch(instance, record);
            },
            Decision::Cancel => instance.fail(FailureReason::HumanCancelled, &mut self.events),
        }
    }

    /// The only path into `Running`.
    fn launch(&mut self, instance: &mut Instance, approval: ApprovalRecord) {
        if !approval.authorizes_launch() {
            instance.fail(
                FailureReason::LaunchFailed("approval does not authorize launch".into()),
                &mut self.events,
            );
            return;
        }
        let Some(verified) = instance.verified.as_ref() else {
            instance.fail(
                FailureReason::Container("no verified package".into()),
                &mut self.events,
            );
            return;
        };

        let request = LaunchRequest {
            instance: instance.id,
            payload: verified.payload.clone(),
            entries: verified.entries.clone(),
            manifest: verified.manifest.clone(),
            args: instance.args.clone(),
            verdict: verified.verdict,
            signer: verified.signer.clone(),
        };
        let notifier = ExitNotifier::new(self.exit_tx.clone());

        instance.approval = Some(approval);
        match self.app_runtime.launch(request, notifier) {
            Ok(process) => {
                self.processes.insert(process, instance.id);
                instance.process = Some(process);
                instance.transition(InstanceState::Running, &mut self.events);
            },
            Err(e) => instance.fail(FailureReason::LaunchFailed(e.to_string()), &mut self.events),
        }
    }

    /// Append bytes to a [`PackageSource::Stream`] instance.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::UnknownInstance`] for an unknown ID
    /// - [`RuntimeError::NotStreaming`] if the instance is not a stream or its
    ///   stream already ended
    /// - [`RuntimeError::TooLarge`] if the package outgrows the download
    ///   limit; the instance then fails on its next tick
    pub fn feed_stream(&mut self, id: InstanceId, bytes: &[u8]) -> RuntimeResult<()> {
        let limit = self.engine.config().max_body_bytes;
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownInstance { id })?;
        let stream = instance
            .open_stream()
            .ok_or(RuntimeError::NotStreaming { id })?;

        let total = (stream.bytes.len() as u64).saturating_add(bytes.len() as u64);
        if total > limit {
            stream.bytes = Vec::new();
            stream.outcome = Some(Err(DownloadError::TooLarge { limit }));
            return Err(RuntimeError::TooLarge { limit });
        }
        stream.bytes.extend_from_slice(bytes);
        Ok(())
    }

    /// End a [`PackageSource::Stream`] instance's input.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownInstance`] or [`RuntimeError::NotStreaming`],
    /// as for [`feed_stream`](Self::feed_stream).
    pub fn finish_stream(&mut self, id: InstanceId, result: StreamResult) -> RuntimeResult<()> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownInstance { id })?;
        let stream = instance
            .open_stream()
            .ok_or(RuntimeError::NotStreaming { id })?;

        stream.outcome = Some(match result {
            StreamResult::Complete => Ok(()),
            StreamResult::Failed(message) => Err(DownloadError::NetworkFailure(message)),
        });
        Ok(())
    }

    /// Send an instance that failed for a network reason back to `Created`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownInstance`] for an unknown ID, or
    /// [`RuntimeError::NotRetryable`] for any other state or reason.
    pub fn retry_instance(&mut self, id: InstanceId) -> RuntimeResult<()> {
        let instance = self
            .instances
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownInstance { id })?;

        let retryable = instance.state == InstanceState::Failed
            && instance
                .failure
                .as_ref()
                .is_some_and(FailureReason::is_retryable);
        if !retryable {
            return Err(RuntimeError::NotRetryable {
                id,
                state: instance.state,
            });
        }

        info!(instance_id = %id, "Retrying instance");
        instance.reset();
        instance.transition(InstanceState::Created, &mut self.events);
        Ok(())
    }

    /// Snapshot of an instance, or `None` once it has been deleted.
    #[must_use]
    pub fn status(&self, id: InstanceId) -> Option<InstanceStatus> {
        let instance = self.instances.get(&id)?;

        let progress = match (&instance.download, &instance.stream) {
            (Some(handle), _) => self.engine.progress(*handle),
            (None, Some(stream)) if instance.state == InstanceState::Downloading => {
                Some(DownloadProgress {
                    received: stream.bytes.len() as u64,
                    expected: None,
                })
            },
            _ => None,
        };
        let verified = instance.verified.as_ref();

        Some(InstanceStatus {
            id,
            source: instance.source.clone(),
            state: instance.state,
            failure: instance.failure.clone(),
            verdict: verified.map(|v| v.verdict),
            signer: verified.map(|v| v.signer.clone()),
            history: instance.history.clone(),
            progress,
            approval: instance.approval.clone(),
            exit_code: instance.exit_code,
        })
    }

    /// IDs of live instances, oldest first.
    #[must_use]
    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.order.clone()
    }

    /// Number of live instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// State changes since the last call, in the order they happened.
    ///
    /// At most [`MAX_PENDING_EVENTS`] are kept between calls; older ones
    /// are dropped.
    pub fn drain_events(&mut self) -> Vec<InstanceEvent> {
        self.events.drain(..).collect()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
