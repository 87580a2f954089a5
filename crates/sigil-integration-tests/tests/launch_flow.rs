//! Integration tests for the instance lifecycle: fetch, verify, decide,
//! launch, exit.

mod common;

use common::Harness;
use sigil_approval::{ApprovalStore, Decision};
use sigil_package::{MANIFEST_ENTRY, PackageWriter, SignatureStatus};
use sigil_runtime::{FailureReason, InstanceEvent, InstanceState, PackageSource};
use sigil_test::{
    ScriptStep, http_ok, self_signed_package, unsigned_package, write_package,
};
use sigil_trust::VerifyVerdict;
use url::Url;

const URL: &str = "http://packages.example.test/app.sgp";

fn remote() -> PackageSource {
    PackageSource::Url(Url::parse(URL).unwrap())
}

// ---------------------------------------------------------------------------
// Remote packages
// ---------------------------------------------------------------------------

#[test]
fn test_verified_remote_package_runs_without_prompt() {
    let mut h = Harness::new();
    let package = h.pki.signed_package("Example Corp", 1);
    h.connector.queue(URL, vec![ScriptStep::Data(http_ok(&package))]);

    let id = h.create(remote());
    let status = h.settle(id);

    assert_eq!(status.state, InstanceState::Running);
    assert_eq!(status.verdict, Some(VerifyVerdict::Verified));
    assert_eq!(status.signer.as_deref(), Some("Example Corp"));
    assert_eq!(h.surface.present_count(), 0);
    assert_eq!(h.runtime.launch_count(), 1);
    assert!(status.visited(InstanceState::Downloading));
    assert!(status.visited(InstanceState::Verifying));
    assert!(!status.visited(InstanceState::AwaitingApproval));
}

#[test]
fn test_unsigned_remote_package_cancelled_never_runs() {
    let mut h = Harness::new();
    h.connector
        .queue(URL, vec![ScriptStep::Data(http_ok(&unsigned_package()))]);
    h.surface.queue(Decision::Cancel);

    let id = h.create(remote());
    let status = h.settle(id);

    assert_eq!(status.state, InstanceState::Failed);
    assert_eq!(status.failure, Some(FailureReason::HumanCancelled));
    assert!(!status.visited(InstanceState::Running));
    assert_eq!(
        h.surface.presented(),
        vec![(VerifyVerdict::NoCertificate, String::new())]
    );
    assert_eq!(h.runtime.launch_count(), 0);
    assert!(h.manager.approvals().is_empty());
}

#[test]
fn test_failed_download_is_retryable() {
    let mut h = Harness::new();
    h.connector.queue(
        URL,
        vec![ScriptStep::Fail("connection reset".to_string())],
    );

    let id = h.create(remote());
    let status = h.settle(id);
    assert_eq!(status.state, InstanceState::Failed);
    assert!(matches!(status.failure, Some(FailureReason::Network(_))));

    let package = h.pki.signed_package("Example Corp", 0);
    h.connector.queue(URL, vec![ScriptStep::Data(http_ok(&package))]);
    h.manager.retry_instance(id).unwrap();

    let status = h.settle(id);
    assert_eq!(status.state, InstanceState::Running);
    assert_eq!(h.connector.connects().len(), 2);
}

// ---------------------------------------------------------------------------
// Local packages and remembered approvals
// ---------------------------------------------------------------------------

#[test]
fn test_self_signed_local_approved_then_relaunched_without_prompt() {
    let mut h = Harness::new();
    h.surface.queue(Decision::Approve);
    let file = write_package(&self_signed_package("Home Brew"));

    let first = h.create(PackageSource::local(file.path()));
    let status = h.settle(first);
    assert_eq!(status.state, InstanceState::Running);
    assert_eq!(status.verdict, Some(VerifyVerdict::SelfSigned));
    assert!(status.approval.as_ref().is_some_and(|a| a.interactive));
    assert_eq!(h.surface.present_count(), 1);

    assert!(h.runtime.exit(0, Some(0)));
    let status = h.run_until(first, InstanceState::Stopped);
    assert_eq!(status.state, InstanceState::Stopped);
    assert_eq!(status.exit_code, Some(0));

    let second = h.create(PackageSource::local(file.path()));
    let status = h.settle(second);
    assert_eq!(status.state, InstanceState::Running);
    assert!(!status.visited(InstanceState::AwaitingApproval));
    assert_eq!(h.surface.present_count(), 1, "no second prompt");
    assert_eq!(h.runtime.launch_count(), 2);
}

#[test]
fn test_approvals_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let approvals_path = dir.path().join("approvals.json");
    let file = write_package(&self_signed_package("Home Brew"));

    {
        let mut h = Harness::new();
        h.surface.queue(Decision::Approve);
        let id = h.create(PackageSource::local(file.path()));
        assert_eq!(h.settle(id).state, InstanceState::Running);
        h.manager.approvals().save(&approvals_path).unwrap();
    }

    let stored = ApprovalStore::load(&approvals_path).unwrap();
    assert_eq!(stored.len(), 1);

    let mut h = Harness::with_approvals(stored);
    let id = h.create(PackageSource::local(file.path()));
    assert_eq!(h.settle(id).state, InstanceState::Running);
    assert_eq!(h.surface.present_count(), 0);
}

#[test]
fn test_approval_does_not_cover_a_different_signer() {
    let mut h = Harness::new();
    h.surface.queue(Decision::Approve);
    let approved = write_package(&self_signed_package("Home Brew"));
    let other = write_package(&self_signed_package("Someone Else"));

    let id = h.create(PackageSource::local(approved.path()));
    assert_eq!(h.settle(id).state, InstanceState::Running);

    let id = h.create(PackageSource::local(other.path()));
    let status = h.settle(id);
    assert_eq!(status.state, InstanceState::Failed);
    assert_eq!(status.failure, Some(FailureReason::HumanCancelled));
    assert_eq!(h.surface.present_count(), 2);
}

#[test]
fn test_corrupt_local_package_fails_as_container_error() {
    let mut h = Harness::new();
    let file = write_package(b"definitely not a package");

    let id = h.create(PackageSource::local(file.path()));
    let status = h.settle(id);
    assert_eq!(status.state, InstanceState::Failed);
    assert!(matches!(status.failure, Some(FailureReason::Container(_))));
    assert_eq!(h.surface.present_count(), 0);
}

#[test]
fn test_local_package_replaced_during_prompt_launches_verified_bytes() {
    let mut h = Harness::new();
    h.surface.queue(Decision::Approve);
    let file = write_package(&self_signed_package("Alice"));

    let id = h.create(PackageSource::local(file.path()));
    let status = h.run_until(id, InstanceState::AwaitingApproval);
    assert_eq!(status.state, InstanceState::AwaitingApproval);

    let replacement = PackageWriter::new()
        .add_entry(MANIFEST_ENTRY, b"[package]\nname = \"hello\"\nversion = \"1.0.0\"\n\n[launch]\nentrypoint = \"bin/hello\"\n".to_vec())
        .add_entry("bin/hello", b"#!/bin/sh\necho replaced\n".to_vec())
        .finish()
        .unwrap();
    std::fs::write(file.path(), &replacement).unwrap();

    let status = h.settle(id);
    assert_eq!(status.state, InstanceState::Running);
    assert_eq!(status.verdict, Some(VerifyVerdict::SelfSigned));
    assert_eq!(status.signer.as_deref(), Some("Alice"));

    let launches = h.runtime.launches();
    assert_eq!(launches.len(), 1);
    let mut package = launches[0].payload.open().unwrap();
    assert_eq!(package.signature_status(), SignatureStatus::Valid);
    assert_eq!(package.certificate_chain().signer_name(), "Alice");
    let entry = package.find_entry("bin/hello").unwrap().unwrap();
    assert_ne!(package.read_entry(&entry).unwrap(), b"#!/bin/sh\necho replaced\n");
}

#[test]
fn test_refused_launch_fails() {
    let mut h = Harness::new();
    h.runtime.refuse_launches(true);
    let file = write_package(&h.pki.signed_package("Example Corp", 0));

    let id = h.create(PackageSource::local(file.path()));
    let status = h.settle(id);
    assert_eq!(status.state, InstanceState::Failed);
    assert!(matches!(status.failure, Some(FailureReason::LaunchFailed(_))));
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[test]
fn test_delete_is_idempotent() {
    let mut h = Harness::new();
    let file = write_package(&h.pki.signed_package("Example Corp", 0));
    let id = h.create(PackageSource::local(file.path()));
    assert_eq!(h.settle(id).state, InstanceState::Running);

    assert!(h.manager.delete_instance(id));
    assert!(!h.manager.delete_instance(id));
    assert!(h.manager.status(id).is_none());
    assert_eq!(h.runtime.terminated().len(), 1);
}

#[test]
fn test_delete_while_awaiting_approval_dismisses_prompt() {
    let mut h = Harness::new();
    let file = write_package(&self_signed_package("Home Brew"));
    let id = h.create(PackageSource::local(file.path()));

    let status = h.run_until(id, InstanceState::AwaitingApproval);
    assert_eq!(status.state, InstanceState::AwaitingApproval);

    assert!(h.manager.delete_instance(id));
    assert_eq!(h.surface.dismiss_count(), 1);
    assert_eq!(h.surface.present_count(), 0);
    assert_eq!(h.runtime.launch_count(), 0);
}

#[test]
fn test_delete_during_download_cancels_transfer() {
    let mut h = Harness::new();
    h.connector.queue(URL, vec![ScriptStep::WouldBlock; 8]);
    let id = h.create(remote());

    let status = h.run_until(id, InstanceState::Downloading);
    assert_eq!(status.state, InstanceState::Downloading);

    assert!(h.manager.delete_instance(id));
    h.manager.tick();
    assert!(h.connector.closed(0));
    assert!(h.manager.drain_events().iter().all(|event| {
        let InstanceEvent::StateChanged { to, .. } = event;
        *to != InstanceState::Running
    }));
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn test_events_follow_history() {
    let mut h = Harness::new();
    let file = write_package(&h.pki.signed_package("Example Corp", 0));
    let id = h.create(PackageSource::local(file.path()));
    let status = h.settle(id);

    let transitions: Vec<(InstanceState, InstanceState)> = h
        .manager
        .drain_events()
        .into_iter()
        .map(|event| {
            let InstanceEvent::StateChanged { from, to, .. } = event;
            (from, to)
        })
        .collect();

    let expected: Vec<(InstanceState, InstanceState)> = status
        .history
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    assert_eq!(transitions, expected);
    assert!(h.manager.drain_events().is_empty());
}
