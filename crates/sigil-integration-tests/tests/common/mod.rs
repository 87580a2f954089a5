//! Shared harness for instance manager integration tests.

use std::sync::Arc;

use sigil_approval::ApprovalStore;
use sigil_crypto::TrustStore;
use sigil_download::{DownloadEngine, EngineConfig};
use sigil_runtime::{InstanceId, InstanceManager, InstanceState, InstanceStatus, PackageSource};
use sigil_test::{MockAppRuntime, RecordingSurface, ScriptedConnector, TestPki};
use sigil_trust::TrustClassifier;

/// Upper bound on ticks before a test gives up waiting.
pub const MAX_TICKS: usize = 64;

/// An instance manager wired to mocks, with handles kept for assertions.
#[allow(dead_code)]
pub struct Harness {
    /// The manager under test.
    pub manager: InstanceManager,
    /// Serves scripted HTTP responses.
    pub connector: ScriptedConnector,
    /// Answers trust prompts.
    pub surface: RecordingSurface,
    /// Records launches.
    pub runtime: MockAppRuntime,
    /// PKI whose root the manager trusts.
    pub pki: TestPki,
}

#[allow(dead_code)]
impl Harness {
    /// Harness trusting a fresh test root, with an empty approval map.
    pub fn new() -> Self {
        Self::with_approvals(ApprovalStore::new())
    }

    /// Harness starting from `approvals`.
    pub fn with_approvals(approvals: ApprovalStore) -> Self {
        let pki = TestPki::new();
        let store: Arc<dyn TrustStore> = pki.store();
        Self::build(pki, store, approvals)
    }

    fn build(pki: TestPki, store: Arc<dyn TrustStore>, approvals: ApprovalStore) -> Self {
        sigil_test::init_test_logging();
        let connector = ScriptedConnector::new();
        let surface = RecordingSurface::new();
        let runtime = MockAppRuntime::new();
        let manager = InstanceManager::new(
            DownloadEngine::new(Box::new(connector.clone()), EngineConfig::default()),
            TrustClassifier::new(store),
            Box::new(surface.clone()),
            Box::new(runtime.clone()),
        )
        .with_approvals(approvals);
        Self {
            manager,
            connector,
            surface,
            runtime,
            pki,
        }
    }

    /// Create an instance for `source` with no arguments.
    pub fn create(&mut self, source: PackageSource) -> InstanceId {
        self.manager.create_instance(source, Vec::new())
    }

    /// Current status of `id`.
    pub fn status(&self, id: InstanceId) -> InstanceStatus {
        self.manager.status(id).expect("instance should exist")
    }

    /// Tick until `id` reaches `state` or a terminal state.
    pub fn run_until(&mut self, id: InstanceId, state: InstanceState) -> InstanceStatus {
        for _ in 0..MAX_TICKS {
            self.manager.tick();
            let status = self.status(id);
            if status.state == state || status.state.is_terminal() {
                return status;
            }
        }
        self.status(id)
    }

    /// Tick until `id` is running, stopped or failed.
    pub fn settle(&mut self, id: InstanceId) -> InstanceStatus {
        self.run_until(id, InstanceState::Running)
    }
}
