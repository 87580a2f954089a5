//! Integration tests for signer classification against a real trust store.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;

use sigil_crypto::{
    CertificateBuilder, CertificateChain, Ed25519TrustStore, FixedClock, KeyPair, TrustStore,
};
use sigil_package::open_at;
use sigil_test::{CountingTrustStore, TestPki, self_signed_package, unsigned_package};
use sigil_trust::{TrustClassifier, VerifyVerdict};

fn chain_of(bytes: Vec<u8>) -> CertificateChain {
    let package = open_at(std::io::Cursor::new(bytes), 0).unwrap();
    package.certificate_chain().clone()
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

#[test]
fn test_verified_regardless_of_intermediate_count() {
    let pki = TestPki::new();
    let classifier = TrustClassifier::new(pki.store());

    for intermediates in 0..3 {
        let chain = chain_of(pki.signed_package("Example Corp", intermediates));
        assert_eq!(chain.len(), intermediates + 1);

        let classification = classifier.evaluate(&chain);
        assert_eq!(
            classification.verdict,
            VerifyVerdict::Verified,
            "{intermediates} intermediates"
        );
        assert_eq!(classification.signer_name, "Example Corp");
    }
}

#[test]
fn test_self_signed_package() {
    let pki = TestPki::new();
    let classifier = TrustClassifier::new(pki.store());

    let chain = chain_of(self_signed_package("Home Brew"));
    let classification = classifier.evaluate(&chain);
    assert_eq!(classification.verdict, VerifyVerdict::SelfSigned);
    assert_eq!(classification.signer_name, "Home Brew");
}

#[test]
fn test_foreign_root_is_not_verified() {
    let ours = TestPki::new();
    let theirs = TestPki::new();
    let classifier = TrustClassifier::new(ours.store());

    let chain = chain_of(theirs.signed_package("Elsewhere", 1));
    assert_ne!(classifier.classify(&chain), VerifyVerdict::Verified);
}

#[test]
fn test_expired_leaf() {
    let root_key = KeyPair::generate();
    let root = CertificateBuilder::new("Root")
        .ca(true)
        .validity(0, 4_000_000_000)
        .self_signed(&root_key);
    let leaf_key = KeyPair::generate();
    let leaf = CertificateBuilder::new("Lapsed")
        .validity(1_000, 2_000)
        .issued_by(&leaf_key.export_public_key(), &root, &root_key);

    let mut store = Ed25519TrustStore::with_clock(FixedClock(10_000));
    store.add_root(root);
    let classifier = TrustClassifier::new(Arc::new(store));

    let classification = classifier.evaluate(&CertificateChain::new(vec![leaf]));
    assert_eq!(classification.verdict, VerifyVerdict::Expired);
    assert_eq!(classification.signer_name, "Lapsed");
}

// ---------------------------------------------------------------------------
// Store interaction
// ---------------------------------------------------------------------------

#[test]
fn test_empty_chain_never_reaches_the_store() {
    let pki = TestPki::new();
    let counting = Arc::new(CountingTrustStore::new(pki.store()));
    let classifier = TrustClassifier::new(Arc::clone(&counting) as Arc<dyn TrustStore>);

    let chain = chain_of(unsigned_package());
    assert!(chain.is_empty());

    let classification = classifier.evaluate(&chain);
    assert_eq!(classification.verdict, VerifyVerdict::NoCertificate);
    assert!(classification.signer_name.is_empty());
    assert!(classification.leaf.is_none());
    assert_eq!(counting.calls(), 0);
}

#[test]
fn test_classification_is_pure() {
    let pki = TestPki::new();
    let counting = Arc::new(CountingTrustStore::new(pki.store()));
    let classifier = TrustClassifier::new(Arc::clone(&counting) as Arc<dyn TrustStore>);
    let chain = chain_of(pki.signed_package("Repeatable", 1));

    let first = classifier.evaluate(&chain);
    let second = classifier.evaluate(&chain);
    assert_eq!(first.verdict, second.verdict);
    assert_eq!(first.signer_name, second.signer_name);
    assert_eq!(first.code, second.code);
    assert_eq!(counting.calls(), 2);
}
