//! Sigil Crypto - Identity and trust primitives for signed packages.
//!
//! This crate provides:
//! - Ed25519 key pairs with secure memory handling
//! - Signatures over package contents
//! - BLAKE3 content hashing (one-shot and streaming)
//! - Certificates and certificate chains identifying package signers
//! - The [`TrustStore`] contract and a root-anchored implementation of it
//!
//! # Example
//!
//! ```
//! use sigil_crypto::{CertificateBuilder, CertificateChain, Ed25519TrustStore, KeyPair, TrustStore};
//!
//! let root_key = KeyPair::generate();
//! let root = CertificateBuilder::new("Sigil Root")
//!     .ca(true)
//!     .self_signed(&root_key);
//!
//! let signer_key = KeyPair::generate();
//! let leaf = CertificateBuilder::new("Example Signer").issued_by(
//!     &signer_key.export_public_key(),
//!     &root,
//!     &root_key,
//! );
//!
//! let mut store = Ed25519TrustStore::new();
//! store.add_root(root);
//!
//! let chain = CertificateChain::new(vec![leaf]);
//! let result = store.verify(chain.leaf().unwrap(), chain.intermediates()).unwrap();
//! assert!(result.ok);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod certificate;
mod chain;
mod error;
mod hash;
mod keypair;
mod signature;
mod store;

pub use certificate::{Certificate, CertificateBuilder};
pub use chain::CertificateChain;
pub use error::{CryptoError, CryptoResult, TrustStoreError};
pub use hash::{ContentHash, StreamingHash};
pub use keypair::{KeyPair, PublicKey};
pub use signature::Signature;
pub use store::{
    ChainVerification, Clock, Ed25519TrustStore, FixedClock, KeyId, MAX_CHAIN_DEPTH, SystemClock,
    TrustStore, VerifyErrorCode,
};
