#![allow(clippy::arithmetic_side_effects)]

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use sigil_crypto::{CertificateBuilder, CertificateChain, KeyPair};

use super::*;
use crate::PackageWriter;
use crate::format::HEADER_LEN;

fn sample_writer() -> PackageWriter {
    PackageWriter::new()
        .timestamp(1_700_000_000)
        .add_entry("main.py", b"print('hello')".to_vec())
        .add_entry("assets/logo.png", vec![0x89, b'P', b'N', b'G'])
}

fn signed_bytes(name: &str) -> (Vec<u8>, CertificateChain) {
    let key = KeyPair::generate();
    let leaf = CertificateBuilder::new(name).self_signed(&key);
    let chain = CertificateChain::new(vec![leaf]);
    (sample_writer().finish_signed(&key, &chain).unwrap(), chain)
}

/// Reader that fails with a non-EOF error once `limit` bytes were read.
struct FailingReader {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inner.position() >= self.limit {
            return Err(io::Error::other("disk on fire"));
        }
        self.inner.read(buf)
    }
}

impl Seek for FailingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[test]
fn test_open_unsigned_package() {
    let mut package = PackageHandle::from_bytes(sample_writer().finish().unwrap()).unwrap();

    assert!(package.certificate_chain().is_empty());
    assert_eq!(package.signature_status(), SignatureStatus::Unsigned);
    assert_eq!(package.version(), (1, 0));
    assert_eq!(package.timestamp(), 1_700_000_000);
    assert_eq!(package.entry_count(), 2);

    let entries: Vec<_> = package.payload_entries().collect::<Result<_, _>>().unwrap();
    assert_eq!(entries[0].name, "main.py");
    assert_eq!(entries[1].name, "assets/logo.png");
    assert_eq!(package.read_entry(&entries[0]).unwrap(), b"print('hello')");
    assert_eq!(package.read_entry(&entries[1]).unwrap().len(), 4);
}

#[test]
fn test_open_signed_package() {
    let (bytes, chain) = signed_bytes("Example Signer");
    let package = PackageHandle::from_bytes(bytes).unwrap();

    assert_eq!(package.signature_status(), SignatureStatus::Valid);
    assert_eq!(package.certificate_chain(), &chain);
    assert_eq!(package.certificate_chain().signer_name(), "Example Signer");
}

#[test]
fn test_entries_are_restartable() {
    let mut package = PackageHandle::from_bytes(sample_writer().finish().unwrap()).unwrap();

    let first: Vec<_> = package.payload_entries().collect::<Result<_, _>>().unwrap();
    let partial = package.payload_entries().next().unwrap().unwrap();
    let second: Vec<_> = package.payload_entries().collect::<Result<_, _>>().unwrap();

    assert_eq!(first, second);
    assert_eq!(partial, first[0]);
}

#[test]
fn test_find_and_copy_entry() {
    let mut package = PackageHandle::from_bytes(sample_writer().finish().unwrap()).unwrap();

    let entry = package.find_entry("assets/logo.png").unwrap().unwrap();
    let mut out = Vec::new();
    assert_eq!(package.copy_entry(&entry, &mut out).unwrap(), 4);
    assert_eq!(out, vec![0x89, b'P', b'N', b'G']);
    assert!(package.find_entry("missing").unwrap().is_none());
}

#[test]
fn test_open_at_offset_inside_larger_file() {
    let (bytes, _) = signed_bytes("Embedded");
    let mut host = vec![0xAA; 100];
    host.extend_from_slice(&bytes);
    host.extend_from_slice(b"trailing launcher data");

    let mut package = open_at(Cursor::new(host), 100).unwrap();
    assert_eq!(package.signature_status(), SignatureStatus::Valid);
    let entry = package.find_entry("main.py").unwrap().unwrap();
    assert_eq!(package.read_entry(&entry).unwrap(), b"print('hello')");
}

#[test]
fn test_manifest_entry() {
    let manifest = "[package]\nname = \"demo\"\nversion = \"1\"\n[launch]\nentrypoint = \"main.py\"\n";
    let bytes = sample_writer()
        .add_entry(crate::MANIFEST_ENTRY, manifest.as_bytes().to_vec())
        .finish()
        .unwrap();

    let mut package = PackageHandle::from_bytes(bytes).unwrap();
    let parsed = package.manifest().unwrap().unwrap();
    assert_eq!(parsed.launch.entrypoint, "main.py");

    let mut bare = PackageHandle::from_bytes(sample_writer().finish().unwrap()).unwrap();
    assert!(bare.manifest().unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Signature mismatch
// ---------------------------------------------------------------------------

#[test]
fn test_tampered_body_drops_chain() {
    let (mut bytes, _) = signed_bytes("Example Signer");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let package = PackageHandle::from_bytes(bytes).unwrap();
    assert_eq!(package.signature_status(), SignatureStatus::Mismatch);
    assert!(package.certificate_chain().is_empty());
}

#[test]
fn test_tampered_timestamp_drops_chain() {
    let (mut bytes, _) = signed_bytes("Example Signer");
    bytes[10] ^= 0x01;

    let package = PackageHandle::from_bytes(bytes).unwrap();
    assert_eq!(package.signature_status(), SignatureStatus::Mismatch);
}

#[test]
fn test_writer_rejects_mismatched_leaf() {
    let key = KeyPair::generate();
    let other = KeyPair::generate();
    let leaf = CertificateBuilder::new("Impostor").self_signed(&other);
    let chain = CertificateChain::new(vec![leaf]);

    // The writer refuses to sign with a mismatched key.
    assert!(matches!(
        sample_writer().finish_signed(&key, &chain),
        Err(PackageError::InvalidInput(_))
    ));
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

#[test]
fn test_bad_magic() {
    let mut bytes = sample_writer().finish().unwrap();
    bytes[0] = b'X';
    assert!(matches!(
        PackageHandle::from_bytes(bytes),
        Err(PackageError::CorruptContainer(_))
    ));
}

#[test]
fn test_unsupported_major_version() {
    let mut bytes = sample_writer().finish().unwrap();
    bytes[6] = 9;
    assert!(matches!(
        PackageHandle::from_bytes(bytes),
        Err(PackageError::CorruptContainer(_))
    ));
}

#[test]
fn test_truncated_header() {
    let bytes = sample_writer().finish().unwrap();
    assert!(matches!(
        PackageHandle::from_bytes(bytes[..10].to_vec()),
        Err(PackageError::CorruptContainer(_))
    ));
}

#[test]
fn test_truncated_chain_block() {
    let (bytes, _) = signed_bytes("Example Signer");
    assert!(matches!(
        PackageHandle::from_bytes(bytes[..HEADER_LEN + 10].to_vec()),
        Err(PackageError::TruncatedSignature)
    ));
}

#[test]
fn test_inconsistent_certificate_count() {
    let (mut bytes, _) = signed_bytes("Example Signer");
    bytes[HEADER_LEN] = 5;
    assert!(matches!(
        PackageHandle::from_bytes(bytes),
        Err(PackageError::TruncatedSignature)
    ));
}

#[test]
fn test_truncated_body() {
    let bytes = sample_writer().finish().unwrap();
    let cut = bytes.len() - 2;
    assert!(matches!(
        PackageHandle::from_bytes(bytes[..cut].to_vec()),
        Err(PackageError::CorruptContainer(_))
    ));
}

#[test]
fn test_entry_out_of_range_stops_iteration() {
    let mut bytes = sample_writer().finish().unwrap();
    // First entry's offset field follows the count, name length and name.
    let offset_pos = HEADER_LEN + 4 + 2 + "main.py".len();
    bytes[offset_pos..offset_pos + 8].copy_from_slice(&u64::MAX.to_le_bytes());

    let mut package = PackageHandle::from_bytes(bytes).unwrap();
    let mut entries = package.payload_entries();
    assert!(matches!(
        entries.next(),
        Some(Err(PackageError::CorruptContainer(_)))
    ));
    assert!(entries.next().is_none());
}

#[test]
fn test_io_failure_propagates() {
    let (bytes, _) = signed_bytes("Example Signer");
    let reader = FailingReader {
        inner: Cursor::new(bytes),
        limit: (HEADER_LEN + 40) as u64,
    };

    assert!(matches!(open(reader), Err(PackageError::IoFailure(_))));
}

#[test]
fn test_content_errors_are_classified() {
    assert!(PackageError::TruncatedSignature.is_content_error());
    assert!(!PackageError::IoFailure(io::Error::other("x")).is_content_error());
}
