//! Signer certificates.
//!
//! A certificate binds a common name to an Ed25519 public key and is signed
//! by its issuer. Encoding:
//!
//! ```text
//! "SGC1" | version u8 | serial u64 | subject u16+bytes | issuer u16+bytes
//!        | subject_key [32] | issuer_key_id [8] | not_before i64 | not_after i64
//!        | flags u8 | signature [64]
//! ```
//!
//! All integers are little-endian. Everything before the signature is the
//! to-be-signed portion.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::hash::ContentHash;
use crate::keypair::{KeyPair, PublicKey};
use crate::signature::{SIGNATURE_LEN, Signature};
use crate::store::KeyId;

const MAGIC: &[u8; 4] = b"SGC1";
const CURRENT_VERSION: u8 = 1;
const FLAG_CA: u8 = 0b0000_0001;

/// Longest subject or issuer name accepted, in bytes.
const MAX_NAME_LEN: usize = 1024;

const ARMOR_BEGIN: &str = "-----BEGIN SIGIL CERTIFICATE-----";
const ARMOR_END: &str = "-----END SIGIL CERTIFICATE-----";

/// Default end of validity for certificates built without an explicit window
/// (2100-01-01T00:00:00Z).
const DEFAULT_NOT_AFTER: i64 = 4_102_444_800;

/// An immutable signer identity record.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    version: u8,
    serial: u64,
    subject: Vec<u8>,
    issuer: Vec<u8>,
    subject_key: PublicKey,
    issuer_key_id: KeyId,
    not_before: i64,
    not_after: i64,
    is_ca: bool,
    signature: Signature,
}

impl Certificate {
    /// Human-readable common name of the subject.
    ///
    /// Returns an empty string when the name is absent or not valid UTF-8.
    #[must_use]
    pub fn common_name(&self) -> String {
        std::str::from_utf8(&self.subject)
            .map(str::to_owned)
            .unwrap_or_default()
    }

    /// Common name of the issuer, with the same fallback as [`Self::common_name`].
    #[must_use]
    pub fn issuer_name(&self) -> String {
        std::str::from_utf8(&self.issuer)
            .map(str::to_owned)
            .unwrap_or_default()
    }

    /// Raw subject bytes as encoded.
    #[must_use]
    pub fn subject_bytes(&self) -> &[u8] {
        &self.subject
    }

    /// Serial number.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Subject public key.
    #[must_use]
    pub fn subject_key(&self) -> &PublicKey {
        &self.subject_key
    }

    /// Key ID of the subject key.
    #[must_use]
    pub fn key_id(&self) -> KeyId {
        self.subject_key.key_id()
    }

    /// Key ID of the key that signed this certificate.
    #[must_use]
    pub fn issuer_key_id(&self) -> KeyId {
        self.issuer_key_id
    }

    /// Start of the validity window (Unix seconds).
    #[must_use]
    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    /// End of the validity window (Unix seconds).
    #[must_use]
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    /// Whether this certificate may issue other certificates.
    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    /// Whether the certificate names its own key as issuer.
    #[must_use]
    pub fn is_self_issued(&self) -> bool {
        self.issuer_key_id == self.key_id()
    }

    /// Fingerprint over the full encoding.
    #[must_use]
    pub fn fingerprint(&self) -> ContentHash {
        ContentHash::hash(&self.encode())
    }

    /// Check that `issuer_key` signed this certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SignatureVerificationFailed`] on mismatch.
    pub fn verify_signed_by(&self, issuer_key: &PublicKey) -> CryptoResult<()> {
        issuer_key.verify(&self.tbs_bytes(), &self.signature)
    }

    /// The to-be-signed portion of the encoding.
    #[must_use]
    pub fn tbs_bytes(&self) -> Vec<u8> {
        encode_tbs(&TbsFields {
            version: self.version,
            serial: self.serial,
            subject: &self.subject,
            issuer: &self.issuer,
            subject_key: &self.subject_key,
            issuer_key_id: self.issuer_key_id,
            not_before: self.not_before,
            not_after: self.not_after,
            is_ca: self.is_ca,
        })
    }

    /// Binary encoding.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.tbs_bytes();
        out.extend_from_slice(self.signature.as_bytes());
        out
    }

    /// Decode the binary encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::MalformedCertificate`] if the bytes are not a
    /// complete certificate.
    pub fn decode(bytes: &[u8]) -> CryptoResult<Self> {
        let mut d = Decoder::new(bytes);

        if d.take(MAGIC.len())? != MAGIC {
            return Err(CryptoError::MalformedCertificate("bad magic".into()));
        }
        let version = d.u8()?;
        if version != CURRENT_VERSION {
            return Err(CryptoError::MalformedCertificate(format!(
                "unsupported version {version}"
            )));
        }
        let serial = d.u64()?;
        let subject = d.name()?;
        let issuer = d.name()?;
        let subject_key = PublicKey::try_from_slice(d.take(32)?)?;
        let issuer_key_id: KeyId = d
            .take(8)?
            .try_into()
            .map_err(|_| CryptoError::MalformedCertificate("issuer key id".into()))?;
        let not_before = d.i64()?;
        let not_after = d.i64()?;
        let flags = d.u8()?;
        let signature = Signature::try_from_slice(d.take(SIGNATURE_LEN)?)?;

        if !d.is_empty() {
            return Err(CryptoError::MalformedCertificate("trailing bytes".into()));
        }

        Ok(Self {
            version,
            serial,
            subject,
            issuer,
            subject_key,
            issuer_key_id,
            not_before,
            not_after,
            is_ca: flags & FLAG_CA != 0,
            signature,
        })
    }

    /// Armored text form (base64 between BEGIN/END lines).
    #[must_use]
    pub fn to_armored(&self) -> String {
        use base64::Engine;
        let body = base64::engine::general_purpose::STANDARD.encode(self.encode());

        let mut out = String::with_capacity(body.len().saturating_add(80));
        out.push_str(ARMOR_BEGIN);
        out.push('\n');
        for line in body.as_bytes().chunks(64) {
            out.push_str(&String::from_utf8_lossy(line));
            out.push('\n');
        }
        out.push_str(ARMOR_END);
        out.push('\n');
        out
    }

    /// Parse every armored certificate in `text`, in order.
    ///
    /// Text outside armor blocks is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an unterminated block, bad base64, or a
    /// malformed certificate.
    pub fn parse_armored(text: &str) -> CryptoResult<Vec<Self>> {
        use base64::Engine;

        let mut certs = Vec::new();
        let mut block: Option<String> = None;

        for line in text.lines().map(str::trim) {
            if line == ARMOR_BEGIN {
                block = Some(String::new());
            } else if line == ARMOR_END {
                let body = block.take().ok_or_else(|| {
                    CryptoError::MalformedCertificate("END without BEGIN".into())
                })?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(body)
                    .map_err(|_| CryptoError::InvalidBase64Encoding)?;
                certs.push(Self::decode(&bytes)?);
            } else if let Some(body) = block.as_mut() {
                body.push_str(line);
            }
        }

        if block.is_some() {
            return Err(CryptoError::MalformedCertificate(
                "unterminated armor block".into(),
            ));
        }
        Ok(certs)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &String::from_utf8_lossy(&self.subject))
            .field("issuer", &String::from_utf8_lossy(&self.issuer))
            .field("key_id", &self.subject_key.key_id_hex())
            .field("serial", &self.serial)
            .field("is_ca", &self.is_ca)
            .finish_non_exhaustive()
    }
}

impl Serialize for Certificate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use base64::Engine;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(self.encode()))
    }
}

impl<'de> Deserialize<'de> for Certificate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use base64::Engine;
        let s = String::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        Self::decode(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Issues certificates.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    subject: Vec<u8>,
    serial: u64,
    not_before: i64,
    not_after: i64,
    is_ca: bool,
}

impl CertificateBuilder {
    /// Start a certificate for `common_name`.
    #[must_use]
    pub fn new(common_name: &str) -> Self {
        Self {
            subject: clamp_name(common_name.as_bytes()),
            serial: rand::random(),
            not_before: 0,
            not_after: DEFAULT_NOT_AFTER,
            is_ca: false,
        }
    }

    /// Use raw subject bytes instead of a UTF-8 name.
    #[must_use]
    pub fn raw_subject(mut self, subject: &[u8]) -> Self {
        self.subject = clamp_name(subject);
        self
    }

    /// Set the serial number.
    #[must_use]
    pub fn serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// Set the validity window (Unix seconds, inclusive).
    #[must_use]
    pub fn validity(mut self, not_before: i64, not_after: i64) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    /// Mark the certificate as a CA.
    #[must_use]
    pub fn ca(mut self, is_ca: bool) -> Self {
        self.is_ca = is_ca;
        self
    }

    /// Issue a certificate for `key` signed by itself.
    #[must_use]
    pub fn self_signed(self, key: &KeyPair) -> Certificate {
        let subject_key = key.export_public_key();
        let issuer = self.subject.clone();
        self.sign(subject_key, issuer, key)
    }

    /// Issue a certificate for `subject_key`, signed by `issuer_key` acting
    /// as `issuer`.
    #[must_use]
    pub fn issued_by(
        self,
        subject_key: &PublicKey,
        issuer: &Certificate,
        issuer_key: &KeyPair,
    ) -> Certificate {
        self.sign(*subject_key, issuer.subject.clone(), issuer_key)
    }

    fn sign(self, subject_key: PublicKey, issuer: Vec<u8>, issuer_key: &KeyPair) -> Certificate {
        let issuer_key_id = issuer_key.key_id();
        let tbs = encode_tbs(&TbsFields {
            version: CURRENT_VERSION,
            serial: self.serial,
            subject: &self.subject,
            issuer: &issuer,
            subject_key: &subject_key,
            issuer_key_id,
            not_before: self.not_before,
            not_after: self.not_after,
            is_ca: self.is_ca,
        });
        let signature = issuer_key.sign(&tbs);

        Certificate {
            version: CURRENT_VERSION,
            serial: self.serial,
            subject: self.subject,
            issuer,
            subject_key,
            issuer_key_id,
            not_before: self.not_before,
            not_after: self.not_after,
            is_ca: self.is_ca,
            signature,
        }
    }
}

fn clamp_name(name: &[u8]) -> Vec<u8> {
    name[..name.len().min(MAX_NAME_LEN)].to_vec()
}

struct TbsFields<'a> {
    version: u8,
    serial: u64,
    subject: &'a [u8],
    issuer: &'a [u8],
    subject_key: &'a PublicKey,
    issuer_key_id: KeyId,
    not_before: i64,
    not_after: i64,
    is_ca: bool,
}

fn encode_tbs(fields: &TbsFields<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        128_usize
            .saturating_add(fields.subject.len())
            .saturating_add(fields.issuer.len()),
    );
    out.extend_from_slice(MAGIC);
    out.push(fields.version);
    out.extend_from_slice(&fields.serial.to_le_bytes());
    put_name(&mut out, fields.subject);
    put_name(&mut out, fields.issuer);
    out.extend_from_slice(fields.subject_key.as_bytes());
    out.extend_from_slice(&fields.issuer_key_id);
    out.extend_from_slice(&fields.not_before.to_le_bytes());
    out.extend_from_slice(&fields.not_after.to_le_bytes());
    out.push(if fields.is_ca { FLAG_CA } else { 0 });
    out
}

fn put_name(out: &mut Vec<u8>, name: &[u8]) {
    let name = &name[..name.len().min(MAX_NAME_LEN)];
    let len = u16::try_from(name.len()).unwrap_or(u16::MAX);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(name);
}

struct Decoder<'a> {
    bytes: &'a [u8],
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn take(&mut self, n: usize) -> CryptoResult<&'a [u8]> {
        if self.bytes.len() < n {
            return Err(CryptoError::MalformedCertificate("truncated".into()));
        }
        let (head, rest) = self.bytes.split_at(n);
        self.bytes = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> CryptoResult<[u8; N]> {
        self.take(N)?
            .try_into()
            .map_err(|_| CryptoError::MalformedCertificate("truncated".into()))
    }

    fn u8(&mut self) -> CryptoResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u64(&mut self) -> CryptoResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> CryptoResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn name(&mut self) -> CryptoResult<Vec<u8>> {
        let len = usize::from(u16::from_le_bytes(self.array()?));
        if len > MAX_NAME_LEN {
            return Err(CryptoError::MalformedCertificate("name too long".into()));
        }
        Ok(self.take(len)?.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn root() -> (KeyPair, Certificate) {
        let key = KeyPair::generate();
        let cert = CertificateBuilder::new("Test Root")
            .ca(true)
            .serial(1)
            .self_signed(&key);
        (key, cert)
    }

    #[test]
    fn test_self_signed_fields() {
        let (key, cert) = root();

        assert_eq!(cert.common_name(), "Test Root");
        assert_eq!(cert.issuer_name(), "Test Root");
        assert_eq!(cert.serial(), 1);
        assert!(cert.is_ca());
        assert!(cert.is_self_issued());
        assert_eq!(cert.key_id(), key.key_id());
        assert!(cert.verify_signed_by(&key.export_public_key()).is_ok());
    }

    #[test]
    fn test_issued_certificate_links_to_issuer() {
        let (root_key, root_cert) = root();
        let leaf_key = KeyPair::generate();
        let leaf = CertificateBuilder::new("Example Signer").issued_by(
            &leaf_key.export_public_key(),
            &root_cert,
            &root_key,
        );

        assert!(!leaf.is_self_issued());
        assert_eq!(leaf.issuer_key_id(), root_cert.key_id());
        assert_eq!(leaf.issuer_name(), "Test Root");
        assert!(leaf.verify_signed_by(root_cert.subject_key()).is_ok());
        assert!(leaf.verify_signed_by(&leaf_key.export_public_key()).is_err());
    }

    #[test]
    fn test_decode_roundtrip_preserves_signature() {
        let (_, cert) = root();
        let decoded = Certificate::decode(&cert.encode()).unwrap();
        assert_eq!(decoded, cert);
        assert_eq!(decoded.fingerprint(), cert.fingerprint());
    }

    #[test]
    fn test_decode_rejects_truncation_and_trailing_bytes() {
        let (_, cert) = root();
        let bytes = cert.encode();

        assert!(Certificate::decode(&bytes[..bytes.len() - 1]).is_err());

        let mut extended = bytes.clone();
        extended.push(0);
        assert!(matches!(
            Certificate::decode(&extended),
            Err(CryptoError::MalformedCertificate(_))
        ));

        let mut bad_magic = bytes;
        bad_magic[0] = b'X';
        assert!(Certificate::decode(&bad_magic).is_err());
    }

    #[test]
    fn test_tampered_subject_breaks_signature() {
        let (key, cert) = root();
        let mut bytes = cert.encode();
        // First subject byte sits after magic, version, serial and length.
        bytes[4 + 1 + 8 + 2] ^= 0x20;
        let tampered = Certificate::decode(&bytes).unwrap();
        assert!(tampered.verify_signed_by(&key.export_public_key()).is_err());
    }

    #[test]
    fn test_malformed_common_name_falls_back_to_empty() {
        let key = KeyPair::generate();
        let cert = CertificateBuilder::new("ignored")
            .raw_subject(&[0xff, 0xfe, 0x41])
            .self_signed(&key);
        assert_eq!(cert.common_name(), "");

        let empty = CertificateBuilder::new("").self_signed(&key);
        assert_eq!(empty.common_name(), "");
    }

    #[test]
    fn test_armor_roundtrip_multiple() {
        let (_, a) = root();
        let (_, b) = root();
        let text = format!("comment line\n{}\n{}", a.to_armored(), b.to_armored());

        let parsed = Certificate::parse_armored(&text).unwrap();
        assert_eq!(parsed, vec![a, b]);
        assert!(Certificate::parse_armored("no certificates here").unwrap().is_empty());
    }

    #[test]
    fn test_armor_unterminated_block() {
        let (_, a) = root();
        let text = a.to_armored().replace(ARMOR_END, "");
        assert!(Certificate::parse_armored(&text).is_err());
    }

    #[test]
    fn test_serde_as_base64() {
        let (_, cert) = root();
        let json = serde_json::to_string(&cert).unwrap();
        let parsed: Certificate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, cert);
    }
}
