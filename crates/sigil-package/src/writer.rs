//! Package writer.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use sigil_crypto::{CertificateChain, KeyPair};

use crate::error::{PackageError, PackageResult};
use crate::format::{
    ENTRY_FIXED_LEN, HEADER_LEN, MAGIC, MAX_CHAIN_CERTS, MAX_ENTRIES, VERSION_MAJOR, VERSION_MINOR,
};
use crate::reader::content_digest;

const SIGNATURE_LEN: usize = 64;

/// Builds package containers in memory.
#[derive(Debug, Clone, Default)]
pub struct PackageWriter {
    entries: Vec<(String, Vec<u8>)>,
    timestamp: Option<u32>,
}

impl PackageWriter {
    /// Empty package.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the header timestamp instead of using the current time.
    #[must_use]
    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Append an entry. Entries are stored in insertion order.
    #[must_use]
    pub fn add_entry(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.entries.push((name.into(), data));
        self
    }

    /// Build an unsigned package.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidInput`] for empty, over-long or
    /// duplicate entry names.
    pub fn finish(self) -> PackageResult<Vec<u8>> {
        let body = self.encode_body()?;
        let header = self.encode_header(&body, 0)?;
        Ok([header.as_slice(), body.as_slice()].concat())
    }

    /// Build a package signed by `leaf_key`, embedding `chain`.
    ///
    /// `chain` must be leaf first and its leaf must carry `leaf_key`'s
    /// public key.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidInput`] for bad entries, an empty or
    /// oversized chain, or a chain whose leaf does not match `leaf_key`.
    pub fn finish_signed(self, leaf_key: &KeyPair, chain: &CertificateChain) -> PackageResult<Vec<u8>> {
        let leaf = chain
            .leaf()
            .ok_or_else(|| PackageError::InvalidInput("cannot sign with an empty chain".into()))?;
        if leaf.subject_key() != &leaf_key.export_public_key() {
            return Err(PackageError::InvalidInput(
                "leaf certificate does not match the signing key".into(),
            ));
        }
        if chain.len() > MAX_CHAIN_CERTS as usize {
            return Err(PackageError::InvalidInput("certificate chain too long".into()));
        }

        let body = self.encode_body()?;

        let mut block = Vec::new();
        block.extend_from_slice(&len_u32(chain.len())?.to_le_bytes());
        for cert in chain {
            let encoded = cert.encode();
            block.extend_from_slice(&len_u32(encoded.len())?.to_le_bytes());
            block.extend_from_slice(&encoded);
        }

        let chain_len = block
            .len()
            .checked_add(2 + SIGNATURE_LEN)
            .ok_or_else(|| PackageError::InvalidInput("certificate block too large".into()))?;
        let header = self.encode_header(&body, len_u32(chain_len)?)?;

        let signature = leaf_key.sign(content_digest(&header, &body).as_bytes());
        let sig_len = u16::try_from(SIGNATURE_LEN)
            .map_err(|_| PackageError::InvalidInput("signature too long".into()))?;

        let mut out = header;
        out.extend_from_slice(&block);
        out.extend_from_slice(&sig_len.to_le_bytes());
        out.extend_from_slice(signature.as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn encode_header(&self, body: &[u8], chain_len: u32) -> PackageResult<Vec<u8>> {
        let timestamp = self.timestamp.unwrap_or_else(now_u32);
        let body_len = u64::try_from(body.len())
            .map_err(|_| PackageError::InvalidInput("body too large".into()))?;

        let mut header = Vec::with_capacity(HEADER_LEN);
        header.extend_from_slice(MAGIC);
        header.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
        header.extend_from_slice(&VERSION_MINOR.to_le_bytes());
        header.extend_from_slice(&timestamp.to_le_bytes());
        header.extend_from_slice(&body_len.to_le_bytes());
        header.extend_from_slice(&chain_len.to_le_bytes());
        Ok(header)
    }

    fn encode_body(&self) -> PackageResult<Vec<u8>> {
        if self.entries.len() > MAX_ENTRIES as usize {
            return Err(PackageError::InvalidInput("too many entries".into()));
        }

        let mut seen = HashSet::new();
        let mut toc_len: u64 = 4;
        for (name, _) in &self.entries {
            if name.is_empty() || name.len() > usize::from(u16::MAX) {
                return Err(PackageError::InvalidInput(format!(
                    "entry name length {} out of range",
                    name.len()
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(PackageError::InvalidInput(format!("duplicate entry {name}")));
            }
            toc_len = toc_len
                .saturating_add(ENTRY_FIXED_LEN)
                .saturating_add(name.len() as u64);
        }

        let mut toc = Vec::new();
        let mut data = Vec::new();
        toc.extend_from_slice(&len_u32(self.entries.len())?.to_le_bytes());
        for (name, bytes) in &self.entries {
            let offset = toc_len.saturating_add(data.len() as u64);
            let name_len = u16::try_from(name.len())
                .map_err(|_| PackageError::InvalidInput("entry name too long".into()))?;
            toc.extend_from_slice(&name_len.to_le_bytes());
            toc.extend_from_slice(name.as_bytes());
            toc.extend_from_slice(&offset.to_le_bytes());
            toc.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            data.extend_from_slice(bytes);
        }

        toc.extend_from_slice(&data);
        Ok(toc)
    }
}

fn len_u32(len: usize) -> PackageResult<u32> {
    u32::try_from(len).map_err(|_| PackageError::InvalidInput("length exceeds u32".into()))
}

fn now_u32() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u32::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}
