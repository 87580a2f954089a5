//! Content hashing using BLAKE3.
//!
//! Package signatures are made over a domain-separated hash of the package
//! body. Bodies can be large, so [`StreamingHash`] lets a reader feed them in
//! chunks without buffering.

use std::fmt;

/// A BLAKE3 content hash (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary data.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental BLAKE3 hasher producing a [`ContentHash`].
#[derive(Clone)]
pub struct StreamingHash {
    inner: blake3::Hasher,
    consumed: u64,
}

impl StreamingHash {
    /// Hasher in key-derivation mode for `domain`.
    #[must_use]
    pub fn with_domain(domain: &str) -> Self {
        Self {
            inner: blake3::Hasher::new_derive_key(domain),
            consumed: 0,
        }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self.consumed = self
            .consumed
            .saturating_add(u64::try_from(data.len()).unwrap_or(u64::MAX));
        self
    }

    /// Total number of bytes fed so far.
    #[must_use]
    pub fn bytes_consumed(&self) -> u64 {
        self.consumed
    }

    /// Finish and return the hash.
    #[must_use]
    pub fn finalize(&self) -> ContentHash {
        ContentHash(*self.inner.finalize().as_bytes())
    }
}

impl fmt::Debug for StreamingHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingHash")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}
