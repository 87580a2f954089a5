//! Trust decision surface.
//!
//! The surface is what a person sees when a package's signer is not already
//! approved. Platforms implement [`TrustDecisionSurface`] with whatever
//! dialog their toolkit offers; the instance manager only sees the two
//! methods below.

use sigil_trust::VerifyVerdict;
use tracing::{debug, info};

/// A person's answer to a trust prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run the package.
    Approve,
    /// Do not run it. Applies to this launch only.
    Cancel,
}

/// Asks a person whether to trust a package's signer.
///
/// The instance manager calls [`present`](Self::present) at most once per
/// instance and never when an existing approval already covers the signer.
pub trait TrustDecisionSurface: Send {
    /// Show `verdict` and `signer_name` and wait for an answer.
    ///
    /// May block the calling thread, for example while a platform runs a
    /// nested modal loop.
    fn present(&mut self, verdict: VerifyVerdict, signer_name: &str) -> Decision;

    /// Abort any pending prompt. Idempotent; valid even if nothing was
    /// presented.
    fn dismiss(&mut self);

    /// Whether a person answers [`present`](Self::present). Approvals from a
    /// non-interactive surface are recorded as policy decisions and never
    /// authorize a non-`Verified` verdict.
    fn is_interactive(&self) -> bool {
        true
    }
}

/// Fixed policy for [`PolicySurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalPolicy {
    /// Approve `Verified` chains, cancel everything else.
    #[default]
    VerifiedOnly,
    /// Cancel everything.
    DenyAll,
}

/// A surface that answers from policy without asking anyone.
///
/// Used for headless hosts and as the default when no platform dialog is
/// wired in.
#[derive(Debug, Default)]
pub struct PolicySurface {
    policy: ApprovalPolicy,
    presented: usize,
    dismissed: usize,
}

impl PolicySurface {
    /// Surface answering with `policy`.
    #[must_use]
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self {
            policy,
            presented: 0,
            dismissed: 0,
        }
    }

    /// The policy in force.
    #[must_use]
    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    /// Number of prompts answered.
    #[must_use]
    pub fn presented(&self) -> usize {
        self.presented
    }

    /// Number of dismiss calls received.
    #[must_use]
    pub fn dismissed(&self) -> usize {
        self.dismissed
    }
}

impl TrustDecisionSurface for PolicySurface {
    fn present(&mut self, verdict: VerifyVerdict, signer_name: &str) -> Decision {
        self.presented = self.presented.saturating_add(1);
        let decision = match self.policy {
            ApprovalPolicy::DenyAll => Decision::Cancel,
            ApprovalPolicy::VerifiedOnly if verdict.is_verified() => Decision::Approve,
            ApprovalPolicy::VerifiedOnly => Decision::Cancel,
        };
        info!(
            signer = signer_name,
            verdict = %verdict,
            decision = ?decision,
            policy = ?self.policy,
            "Trust decision made by policy"
        );
        decision
    }

    fn dismiss(&mut self) {
        self.dismissed = self.dismissed.saturating_add(1);
        debug!("Policy surface dismissed");
    }

    fn is_interactive(&self) -> bool {
        false
    }
}
