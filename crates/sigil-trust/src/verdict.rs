//! Trust verdicts.

use std::fmt;

use serde::{Deserialize, Serialize};
use sigil_crypto::VerifyErrorCode;

/// The closed set of outcomes a person is asked to decide on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyVerdict {
    /// Chain anchored in a trusted root.
    Verified,
    /// Signed, but by a certificate no trusted authority vouches for.
    SelfSigned,
    /// A certificate in the chain is outside its validity window.
    Expired,
    /// The package carries no certificate.
    NoCertificate,
    /// Any other verification failure.
    Other,
}

impl VerifyVerdict {
    /// Reduce a failed store outcome to a verdict by category.
    #[must_use]
    pub fn from_failure(code: VerifyErrorCode) -> Self {
        if code.is_validity_window() {
            Self::Expired
        } else if code.is_self_signed() {
            Self::SelfSigned
        } else {
            Self::Other
        }
    }

    /// Whether the verdict came from a trusted chain.
    #[must_use]
    pub fn is_verified(self) -> bool {
        self == Self::Verified
    }

    /// Short explanation suitable for a prompt.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Verified => "signed by a verified publisher",
            Self::SelfSigned => "signed by a publisher no trusted authority vouches for",
            Self::Expired => "signed with a certificate that is expired or not yet valid",
            Self::NoCertificate => "not signed",
            Self::Other => "signed, but the signature could not be verified",
        }
    }
}

impl fmt::Display for VerifyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Verified => "verified",
            Self::SelfSigned => "self_signed",
            Self::Expired => "expired",
            Self::NoCertificate => "no_certificate",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}
