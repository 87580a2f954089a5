//! Prelude module - commonly used types for convenient import.
//!
//! Use `use sigil_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult, TrustStoreError};

// Keys and signatures
pub use crate::{KeyPair, PublicKey, Signature};

// Hashing
pub use crate::{ContentHash, StreamingHash};

// Certificates
pub use crate::{Certificate, CertificateBuilder, CertificateChain};

// Trust store
pub use crate::{ChainVerification, Ed25519TrustStore, TrustStore, VerifyErrorCode};
