//! Ordered certificate chains.

use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;

/// Certificates presented by a package, leaf first.
///
/// Entries after the leaf are intermediates up to, but not including, a root
/// the trust store already holds. An empty chain means the package is
/// unsigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateChain(Vec<Certificate>);

impl CertificateChain {
    /// Build a chain from leaf-first certificates.
    #[must_use]
    pub fn new(certificates: Vec<Certificate>) -> Self {
        Self(certificates)
    }

    /// The unsigned chain.
    #[must_use]
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of certificates including the leaf.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The signer's certificate.
    #[must_use]
    pub fn leaf(&self) -> Option<&Certificate> {
        self.0.first()
    }

    /// Everything after the leaf.
    #[must_use]
    pub fn intermediates(&self) -> &[Certificate] {
        self.0.get(1..).unwrap_or_default()
    }

    /// Leaf common name, or an empty string for an unsigned chain.
    #[must_use]
    pub fn signer_name(&self) -> String {
        self.leaf().map(Certificate::common_name).unwrap_or_default()
    }

    /// Iterate leaf first.
    pub fn iter(&self) -> std::slice::Iter<'_, Certificate> {
        self.0.iter()
    }

    /// Take the certificates out.
    #[must_use]
    pub fn into_vec(self) -> Vec<Certificate> {
        self.0
    }
}

impl<'a> IntoIterator for &'a CertificateChain {
    type Item = &'a Certificate;
    type IntoIter = std::slice::Iter<'a, Certificate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Certificate>> for CertificateChain {
    fn from(certificates: Vec<Certificate>) -> Self {
        Self(certificates)
    }
}
