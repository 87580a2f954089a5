//! Approval records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sigil_crypto::Certificate;
use sigil_trust::VerifyVerdict;

/// Authorization for an instance to run, keyed by signer common name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Signer common name (empty for unsigned packages).
    pub signer: String,
    /// Approved for future launches.
    pub approved: bool,
    /// Verdict the approval was given under.
    pub verdict: VerifyVerdict,
    /// Whether a person made the decision (as opposed to policy).
    pub interactive: bool,
    /// When the decision was made.
    pub decided_at: DateTime<Utc>,
    /// Leaf certificate at the time of approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl ApprovalRecord {
    /// A person approved `signer` under `verdict`.
    #[must_use]
    pub fn interactive(
        signer: impl Into<String>,
        verdict: VerifyVerdict,
        certificate: Option<Certificate>,
    ) -> Self {
        Self {
            signer: signer.into(),
            approved: true,
            verdict,
            interactive: true,
            decided_at: Utc::now(),
            certificate,
        }
    }

    /// Policy approved a `Verified` chain for `signer` without asking.
    #[must_use]
    pub fn automatic(signer: impl Into<String>, certificate: Option<Certificate>) -> Self {
        Self {
            signer: signer.into(),
            approved: true,
            verdict: VerifyVerdict::Verified,
            interactive: false,
            decided_at: Utc::now(),
            certificate,
        }
    }

    /// A non-interactive surface approved `signer` under `verdict`.
    #[must_use]
    pub fn by_policy(
        signer: impl Into<String>,
        verdict: VerifyVerdict,
        certificate: Option<Certificate>,
    ) -> Self {
        Self {
            signer: signer.into(),
            approved: true,
            verdict,
            interactive: false,
            decided_at: Utc::now(),
            certificate,
        }
    }

    /// Whether this record authorizes running: an approved `Verified`
    /// verdict, or an interactive approval of any other verdict.
    #[must_use]
    pub fn authorizes_launch(&self) -> bool {
        self.approved && (self.verdict.is_verified() || self.interactive)
    }

    /// Whether this record covers a new launch by `signer` under `verdict`.
    #[must_use]
    pub fn covers(&self, signer: &str, verdict: VerifyVerdict) -> bool {
        self.approved
            && self.signer == signer
            && (self.verdict == verdict || verdict.is_verified())
            && verdict != VerifyVerdict::NoCertificate
    }
}
