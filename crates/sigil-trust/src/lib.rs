//! Sigil Trust - Trust classification of package signers.
//!
//! The [`TrustClassifier`] takes a package's certificate chain, runs it
//! through a [`TrustStore`](sigil_crypto::TrustStore) and reduces the raw
//! outcome to a [`VerifyVerdict`]:
//!
//! | Store outcome                              | Verdict         |
//! |--------------------------------------------|-----------------|
//! | empty chain (store not consulted)          | `NoCertificate` |
//! | ok                                         | `Verified`      |
//! | not-yet-valid / expired anywhere in chain  | `Expired`       |
//! | self-signed leaf or untrusted self-signed  | `SelfSigned`    |
//! | anything else, or the store failed to run  | `Other`         |

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod classifier;
mod verdict;

pub use classifier::{Classification, TrustClassifier};
pub use verdict::VerifyVerdict;
