//! Trust classifier.

use std::fmt;
use std::sync::Arc;

use sigil_crypto::{Certificate, CertificateChain, TrustStore, VerifyErrorCode};
use tracing::{info, warn};

use crate::verdict::VerifyVerdict;

/// Full result of classifying a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The verdict.
    pub verdict: VerifyVerdict,
    /// Leaf common name, empty when absent or malformed.
    pub signer_name: String,
    /// Raw store code, if the store was consulted and ran.
    pub code: Option<VerifyErrorCode>,
    /// The leaf certificate, if any.
    pub leaf: Option<Certificate>,
}

/// Maps certificate chains to verdicts through a trust store.
///
/// Classification is a pure function of the chain and the store's state;
/// nothing is cached between calls.
#[derive(Clone)]
pub struct TrustClassifier {
    store: Arc<dyn TrustStore>,
}

impl TrustClassifier {
    /// Create a classifier over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    /// Verdict for `chain`.
    #[must_use]
    pub fn classify(&self, chain: &CertificateChain) -> VerifyVerdict {
        self.evaluate(chain).verdict
    }

    /// Verdict, signer name and raw code for `chain`.
    #[must_use]
    pub fn evaluate(&self, chain: &CertificateChain) -> Classification {
        let Some(leaf) = chain.leaf() else {
            return Classification {
                verdict: VerifyVerdict::NoCertificate,
                signer_name: String::new(),
                code: None,
                leaf: None,
            };
        };

        let signer_name = leaf.common_name();
        let (verdict, code) = match self.store.verify(leaf, chain.intermediates()) {
            Ok(result) if result.ok => (VerifyVerdict::Verified, Some(result.code)),
            Ok(result) => (VerifyVerdict::from_failure(result.code), Some(result.code)),
            Err(e) => {
                warn!(signer = %signer_name, error = %e, "Trust store failed to run");
                (VerifyVerdict::Other, None)
            },
        };

        info!(
            signer = %signer_name,
            verdict = %verdict,
            certificates = chain.len(),
            "Classified certificate chain"
        );

        Classification {
            verdict,
            signer_name,
            code,
            leaf: Some(leaf.clone()),
        }
    }
}

impl fmt::Debug for TrustClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustClassifier").finish_non_exhaustive()
    }
}
