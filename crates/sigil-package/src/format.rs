//! Container layout constants.
//!
//! ```text
//! header : magic "sgp\0\n\r" | major u16 | minor u16 | timestamp u32 | body_len u64 | chain_len u32
//! chain  : cert_count u32 | (cert_len u32 | cert)* | sig_len u16 | signature
//! body   : entry_count u32 | (name_len u16 | name | offset u64 | size u64)* | entry data
//! ```
//!
//! Integers are little-endian. Entry offsets are relative to the start of the
//! body. The signature is made by the leaf key over
//! `BLAKE3-derive-key(SIGNATURE_DOMAIN, header[..SIGNED_HEADER_LEN] || body)`,
//! so it does not cover the chain block itself.

/// Container magic.
pub const MAGIC: &[u8; 6] = b"sgp\0\n\r";

/// Major version written and accepted.
pub const VERSION_MAJOR: u16 = 1;

/// Minor version written.
pub const VERSION_MINOR: u16 = 0;

/// Fixed header length.
pub const HEADER_LEN: usize = 26;

/// Header bytes covered by the signature (everything except `chain_len`).
pub const SIGNED_HEADER_LEN: usize = 22;

/// Domain string for the content hash that is signed.
pub const SIGNATURE_DOMAIN: &str = "sigil-package-v1 content signature";

/// Largest certificate chain block accepted.
pub const MAX_CHAIN_BLOCK: u32 = 256 * 1024;

/// Most certificates accepted in one chain.
pub const MAX_CHAIN_CERTS: u32 = 16;

/// Most table-of-contents entries accepted.
pub const MAX_ENTRIES: u32 = 65_536;

/// Chunk size used when streaming the body through the hasher.
pub const HASH_CHUNK: usize = 4096;

/// Fixed bytes per table-of-contents entry besides the name.
pub(crate) const ENTRY_FIXED_LEN: u64 = 2 + 8 + 8;
