//! Trust store adapter.
//!
//! [`TrustStore`] is the single seam between package verification and
//! whatever certificate-validation facility backs it. [`Ed25519TrustStore`]
//! is the built-in backend: a set of trusted root certificates plus a clock.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::error::{CryptoError, CryptoResult, TrustStoreError};

/// Short key identifier (first 8 bytes of an Ed25519 public key).
pub type KeyId = [u8; 8];

/// Longest leaf-to-root path the built-in store will build.
pub const MAX_CHAIN_DEPTH: usize = 10;

/// Raw outcome codes reported by a trust store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorCode {
    /// The chain validated.
    Ok,
    /// A certificate's validity window has not started.
    CertNotYetValid,
    /// A certificate's validity window has ended.
    CertHasExpired,
    /// The leaf is self-signed and not itself trusted.
    DepthZeroSelfSignedCert,
    /// A self-signed certificate above the leaf is not trusted.
    SelfSignedCertInChain,
    /// No issuer could be found for a certificate.
    UnableToGetIssuerCert,
    /// A certificate's signature does not match its issuer's key.
    CertSignatureFailure,
    /// An issuing certificate is not a CA.
    InvalidCa,
    /// The path exceeds [`MAX_CHAIN_DEPTH`].
    CertChainTooLong,
    /// Any other failure.
    Unspecified,
}

impl VerifyErrorCode {
    /// Not-yet-valid or expired, anywhere in the chain.
    #[must_use]
    pub fn is_validity_window(self) -> bool {
        matches!(self, Self::CertNotYetValid | Self::CertHasExpired)
    }

    /// Self-signed without a trusted anchor.
    #[must_use]
    pub fn is_self_signed(self) -> bool {
        matches!(
            self,
            Self::DepthZeroSelfSignedCert | Self::SelfSignedCertInChain
        )
    }
}

impl fmt::Display for VerifyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::CertNotYetValid => "certificate is not yet valid",
            Self::CertHasExpired => "certificate has expired",
            Self::DepthZeroSelfSignedCert => "self-signed certificate",
            Self::SelfSignedCertInChain => "self-signed certificate in chain",
            Self::UnableToGetIssuerCert => "unable to get issuer certificate",
            Self::CertSignatureFailure => "certificate signature failure",
            Self::InvalidCa => "issuer is not a CA",
            Self::CertChainTooLong => "certificate chain too long",
            Self::Unspecified => "unspecified verification failure",
        };
        f.write_str(s)
    }
}

/// Result of a verification that ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainVerification {
    /// Whether the chain is trusted.
    pub ok: bool,
    /// Raw outcome code; [`VerifyErrorCode::Ok`] when `ok` is true.
    pub code: VerifyErrorCode,
}

impl ChainVerification {
    /// A successful verification.
    #[must_use]
    pub const fn trusted() -> Self {
        Self {
            ok: true,
            code: VerifyErrorCode::Ok,
        }
    }

    /// A failed verification with `code`.
    #[must_use]
    pub const fn rejected(code: VerifyErrorCode) -> Self {
        Self { ok: false, code }
    }
}

/// A certificate-validation facility.
///
/// `Err` means the store could not run at all. A chain that ran and was
/// rejected is `Ok` with `ok == false`.
pub trait TrustStore: Send + Sync {
    /// Verify `leaf` using `intermediates` to reach a trusted root.
    ///
    /// # Errors
    ///
    /// Returns [`TrustStoreError`] when the backend is unusable.
    fn verify(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
    ) -> Result<ChainVerification, TrustStoreError>;
}

/// Source of "now" for validity checks.
pub trait Clock: Send + Sync {
    /// Current time in Unix seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TrustStoreError::Clock`] if the time cannot be read.
    fn now(&self) -> Result<i64, TrustStoreError>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<i64, TrustStoreError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TrustStoreError::Clock(e.to_string()))?;
        i64::try_from(elapsed.as_secs()).map_err(|e| TrustStoreError::Clock(e.to_string()))
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> Result<i64, TrustStoreError> {
        Ok(self.0)
    }
}

/// Trust store anchored on a set of root certificates.
pub struct Ed25519TrustStore {
    roots: HashMap<KeyId, Certificate>,
    clock: Box<dyn Clock>,
}

impl Ed25519TrustStore {
    /// Empty store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Empty store using `clock`.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            roots: HashMap::new(),
            clock: Box::new(clock),
        }
    }

    /// Trust `root`. Replaces any root with the same key.
    pub fn add_root(&mut self, root: Certificate) {
        debug!(
            root = %root.common_name(),
            key_id = %hex::encode(root.key_id()),
            "Adding trusted root"
        );
        self.roots.insert(root.key_id(), root);
    }

    /// Load every armored certificate found in the files of `dir`.
    ///
    /// A missing directory loads nothing. Files that fail to parse are
    /// skipped with a warning. Returns the number of roots added.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] if the directory cannot be listed.
    pub fn load_roots_dir(&mut self, dir: impl AsRef<Path>) -> CryptoResult<usize> {
        let dir = dir.as_ref();
        if !dir.exists() {
            debug!(dir = %dir.display(), "Trust roots directory does not exist");
            return Ok(0);
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| CryptoError::IoError(e.to_string()))? {
            let entry = entry.map_err(|e| CryptoError::IoError(e.to_string()))?;
            if entry.path().is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut added = 0_usize;
        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(|e| CryptoError::IoError(e.to_string()))
                .and_then(|text| Certificate::parse_armored(&text));
            match parsed {
                Ok(certs) => {
                    for cert in certs {
                        self.add_root(cert);
                        added = added.saturating_add(1);
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable trust root");
                },
            }
        }
        Ok(added)
    }

    /// Trusted roots, in no particular order.
    pub fn roots(&self) -> impl Iterator<Item = &Certificate> {
        self.roots.values()
    }

    /// Number of trusted roots.
    #[must_use]
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Build the leaf-to-anchor path, returning the path and its anchor.
    fn build_path<'a>(
        &'a self,
        leaf: &'a Certificate,
        intermediates: &'a [Certificate],
    ) -> Result<(Vec<&'a Certificate>, &'a Certificate), VerifyErrorCode> {
        let mut path = vec![leaf];
        let mut current = leaf;

        loop {
            if let Some(anchor) = self.roots.get(&current.issuer_key_id()) {
                return Ok((path, anchor));
            }

            if current.is_self_issued() {
                return Err(if path.len() == 1 {
                    VerifyErrorCode::DepthZeroSelfSignedCert
                } else {
                    VerifyErrorCode::SelfSignedCertInChain
                });
            }

            if path.len() >= MAX_CHAIN_DEPTH {
                return Err(VerifyErrorCode::CertChainTooLong);
            }

            let issuer_id = current.issuer_key_id();
            current = intermediates
                .iter()
                .find(|c| c.key_id() == issuer_id)
                .ok_or(VerifyErrorCode::UnableToGetIssuerCert)?;
            path.push(current);
        }
    }

    fn check_path(
        path: &[&Certificate],
        anchor: &Certificate,
        now: i64,
    ) -> Result<(), VerifyErrorCode> {
        // Anchor first, then down to the leaf.
        let mut issuer = anchor;
        check_validity(anchor, now)?;

        for cert in path.iter().rev() {
            // A trusted self-signed leaf is its own anchor.
            let anchors_itself = std::ptr::eq(*cert, anchor) || **cert == *anchor;
            if !anchors_itself {
                if !issuer.is_ca() {
                    return Err(VerifyErrorCode::InvalidCa);
                }
                cert.verify_signed_by(issuer.subject_key())
                    .map_err(|_| VerifyErrorCode::CertSignatureFailure)?;
                check_validity(cert, now)?;
            }
            issuer = cert;
        }
        Ok(())
    }
}

fn check_validity(cert: &Certificate, now: i64) -> Result<(), VerifyErrorCode> {
    if now < cert.not_before() {
        return Err(VerifyErrorCode::CertNotYetValid);
    }
    if now > cert.not_after() {
        return Err(VerifyErrorCode::CertHasExpired);
    }
    Ok(())
}

impl TrustStore for Ed25519TrustStore {
    fn verify(
        &self,
        leaf: &Certificate,
        intermediates: &[Certificate],
    ) -> Result<ChainVerification, TrustStoreError> {
        let now = self.clock.now()?;

        let result = self
            .build_path(leaf, intermediates)
            .and_then(|(path, anchor)| Self::check_path(&path, anchor, now));

        let verification = match result {
            Ok(()) => ChainVerification::trusted(),
            Err(code) => ChainVerification::rejected(code),
        };
        debug!(
            signer = %leaf.common_name(),
            intermediates = intermediates.len(),
            code = %verification.code,
            "Chain verification finished"
        );
        Ok(verification)
    }
}

impl Default for Ed25519TrustStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Ed25519TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519TrustStore")
            .field("roots", &self.roots.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
