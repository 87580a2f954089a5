//! Package reader.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use sigil_crypto::{Certificate, CertificateChain, Signature, StreamingHash};
use tracing::{debug, warn};

use crate::entry::PayloadEntry;
use crate::error::{PackageError, PackageResult};
use crate::format::{
    ENTRY_FIXED_LEN, HASH_CHUNK, HEADER_LEN, MAGIC, MAX_CHAIN_BLOCK, MAX_CHAIN_CERTS, MAX_ENTRIES,
    SIGNATURE_DOMAIN, SIGNED_HEADER_LEN, VERSION_MAJOR,
};
use crate::manifest::{MANIFEST_ENTRY, PackageManifest};

/// Outcome of the content signature check done at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The package carries no certificate chain.
    Unsigned,
    /// The leaf key signed exactly these contents.
    Valid,
    /// A chain was present but its signature does not match the contents.
    /// The chain has been discarded and the package is treated as unsigned.
    Mismatch,
}

/// Open a package that starts at the beginning of `reader`.
///
/// # Errors
///
/// See [`open_at`].
pub fn open<R: Read + Seek>(reader: R) -> PackageResult<PackageHandle<R>> {
    open_at(reader, 0)
}

/// Open a package that starts `offset` bytes into `reader`.
///
/// Reads the header and certificate chain, then streams the body through the
/// signature hash. Nothing else is buffered.
///
/// # Errors
///
/// - [`PackageError::CorruptContainer`] for a bad header or a body shorter
///   than the header declares.
/// - [`PackageError::TruncatedSignature`] when the chain block is cut short
///   or inconsistent.
/// - [`PackageError::IoFailure`] for any other stream failure.
pub fn open_at<R: Read + Seek>(mut reader: R, offset: u64) -> PackageResult<PackageHandle<R>> {
    reader.seek(SeekFrom::Start(offset))?;

    let mut header = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header)
        .map_err(|e| eof_as(e, || corrupt("header truncated")))?;
    let header_info = PackageHeader::parse(&header)?;

    let chain_block = if header_info.chain_len == 0 {
        None
    } else {
        if header_info.chain_len > MAX_CHAIN_BLOCK {
            return Err(corrupt("certificate block too large"));
        }
        let mut block = vec![0u8; to_usize(u64::from(header_info.chain_len))?];
        reader
            .read_exact(&mut block)
            .map_err(|e| eof_as(e, || PackageError::TruncatedSignature))?;
        Some(ChainBlock::parse(&block)?)
    };

    let body_start = offset
        .checked_add(HEADER_LEN as u64)
        .and_then(|n| n.checked_add(u64::from(header_info.chain_len)))
        .ok_or_else(|| corrupt("package offsets overflow"))?;
    let body_end = body_start
        .checked_add(header_info.body_len)
        .ok_or_else(|| corrupt("package offsets overflow"))?;

    let stream_end = reader.seek(SeekFrom::End(0))?;
    if stream_end < body_end {
        return Err(corrupt("package body truncated"));
    }

    let (chain, signature_status) = match chain_block {
        None => (CertificateChain::empty(), SignatureStatus::Unsigned),
        Some(block) => {
            let digest = hash_contents(&mut reader, &header, body_start, header_info.body_len)?;
            let leaf_key = block.chain.leaf().map(|leaf| *leaf.subject_key());
            let matches = match (leaf_key, Signature::try_from_slice(&block.signature)) {
                (Some(key), Ok(signature)) => key.verify(digest.as_bytes(), &signature).is_ok(),
                _ => false,
            };

            if matches {
                (block.chain, SignatureStatus::Valid)
            } else {
                warn!(
                    signer = %block.chain.signer_name(),
                    "Package signature does not match its contents; treating as unsigned"
                );
                (CertificateChain::empty(), SignatureStatus::Mismatch)
            }
        },
    };

    if header_info.body_len < 4 {
        return Err(corrupt("body shorter than table of contents"));
    }
    reader.seek(SeekFrom::Start(body_start))?;
    let mut count = [0u8; 4];
    reader
        .read_exact(&mut count)
        .map_err(|e| eof_as(e, || corrupt("table of contents missing")))?;
    let entry_count = u32::from_le_bytes(count);
    if entry_count > MAX_ENTRIES {
        return Err(corrupt("too many entries"));
    }

    debug!(
        offset,
        certificates = chain.len(),
        signature = ?signature_status,
        entries = entry_count,
        body_len = header_info.body_len,
        "Opened package"
    );

    Ok(PackageHandle {
        reader,
        header: header_info,
        chain,
        signature_status,
        body_start,
        entry_count,
    })
}

/// An open package: certificate chain plus lazy access to entries.
pub struct PackageHandle<R> {
    reader: R,
    header: PackageHeader,
    chain: CertificateChain,
    signature_status: SignatureStatus,
    body_start: u64,
    entry_count: u32,
}

impl<R: Read + Seek> PackageHandle<R> {
    /// The embedded chain, leaf first. Empty when unsigned or when the
    /// signature did not match.
    #[must_use]
    pub fn certificate_chain(&self) -> &CertificateChain {
        &self.chain
    }

    /// Result of the content signature check.
    #[must_use]
    pub fn signature_status(&self) -> SignatureStatus {
        self.signature_status
    }

    /// Format version as `(major, minor)`.
    #[must_use]
    pub fn version(&self) -> (u16, u16) {
        (self.header.major, self.header.minor)
    }

    /// Packager timestamp (Unix seconds).
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    /// Length of the body in bytes.
    #[must_use]
    pub fn body_len(&self) -> u64 {
        self.header.body_len
    }

    /// Number of entries in the table of contents.
    #[must_use]
    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    /// Lazily iterate the table of contents.
    ///
    /// Each call starts again from the first entry. The iterator stops after
    /// the first error.
    pub fn payload_entries(&mut self) -> PayloadEntries<'_, R> {
        PayloadEntries {
            reader: &mut self.reader,
            pos: self.body_start.saturating_add(4),
            body_start: self.body_start,
            body_len: self.header.body_len,
            remaining: self.entry_count,
            done: false,
        }
    }

    /// Find an entry by name.
    ///
    /// # Errors
    ///
    /// Returns any error hit while scanning the table of contents.
    pub fn find_entry(&mut self, name: &str) -> PackageResult<Option<PayloadEntry>> {
        for entry in self.payload_entries() {
            let entry = entry?;
            if entry.name == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Read an entry's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::IoFailure`] if the stream fails.
    pub fn read_entry(&mut self, entry: &PayloadEntry) -> PackageResult<Vec<u8>> {
        let mut out = Vec::with_capacity(to_usize(entry.size)?);
        self.copy_entry(entry, &mut out)?;
        Ok(out)
    }

    /// Stream an entry's bytes into `out`, returning the number copied.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::CorruptContainer`] if the entry lies outside
    /// the body and [`PackageError::IoFailure`] if either stream fails.
    pub fn copy_entry<W: Write>(&mut self, entry: &PayloadEntry, out: &mut W) -> PackageResult<u64> {
        check_range(entry.offset, entry.size, self.header.body_len)?;
        let start = self
            .body_start
            .checked_add(entry.offset)
            .ok_or_else(|| corrupt("entry offset overflow"))?;
        self.reader.seek(SeekFrom::Start(start))?;

        let copied = io::copy(&mut (&mut self.reader).take(entry.size), out)?;
        if copied != entry.size {
            return Err(corrupt("entry data truncated"));
        }
        Ok(copied)
    }

    /// Parse the `package.toml` entry if the package has one.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::InvalidManifest`] if it exists but is invalid.
    pub fn manifest(&mut self) -> PackageResult<Option<PackageManifest>> {
        let Some(entry) = self.find_entry(MANIFEST_ENTRY)? else {
            return Ok(None);
        };
        let bytes = self.read_entry(&entry)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| PackageError::InvalidManifest("not valid UTF-8".into()))?;
        PackageManifest::parse(&text).map(Some)
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl PackageHandle<Cursor<Vec<u8>>> {
    /// Open a package held in memory.
    ///
    /// # Errors
    ///
    /// See [`open_at`].
    pub fn from_bytes(bytes: Vec<u8>) -> PackageResult<Self> {
        open(Cursor::new(bytes))
    }
}

impl<R> std::fmt::Debug for PackageHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageHandle")
            .field("version", &(self.header.major, self.header.minor))
            .field("certificates", &self.chain.len())
            .field("signature_status", &self.signature_status)
            .field("entries", &self.entry_count)
            .finish_non_exhaustive()
    }
}

/// Lazy iterator over a package's table of contents.
pub struct PayloadEntries<'a, R> {
    reader: &'a mut R,
    pos: u64,
    body_start: u64,
    body_len: u64,
    remaining: u32,
    done: bool,
}

impl<R: Read + Seek> PayloadEntries<'_, R> {
    fn read_next(&mut self) -> PackageResult<PayloadEntry> {
        self.reader.seek(SeekFrom::Start(self.pos))?;

        let mut len = [0u8; 2];
        self.read_toc(&mut len)?;
        let name_len = u16::from_le_bytes(len);

        let mut name = vec![0u8; usize::from(name_len)];
        self.read_toc(&mut name)?;
        let name = String::from_utf8(name).map_err(|_| corrupt("entry name is not UTF-8"))?;

        let mut range = [0u8; 16];
        self.read_toc(&mut range)?;
        let (offset, size) = range.split_at(8);
        let offset = u64::from_le_bytes(offset.try_into().map_err(|_| corrupt("entry offset"))?);
        let size = u64::from_le_bytes(size.try_into().map_err(|_| corrupt("entry size"))?);

        let consumed = ENTRY_FIXED_LEN.saturating_add(u64::from(name_len));
        self.pos = self.pos.saturating_add(consumed);
        let toc_end = self.pos.saturating_sub(self.body_start);
        if toc_end > self.body_len {
            return Err(corrupt("table of contents overruns the body"));
        }
        check_range(offset, size, self.body_len)?;

        Ok(PayloadEntry { name, offset, size })
    }

    fn read_toc(&mut self, buf: &mut [u8]) -> PackageResult<()> {
        self.reader
            .read_exact(buf)
            .map_err(|e| eof_as(e, || corrupt("table of contents truncated")))
    }
}

impl<R: Read + Seek> Iterator for PayloadEntries<'_, R> {
    type Item = PackageResult<PayloadEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);

        let result = self.read_next();
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            (0, usize::try_from(self.remaining).ok())
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PackageHeader {
    major: u16,
    minor: u16,
    timestamp: u32,
    body_len: u64,
    chain_len: u32,
}

impl PackageHeader {
    fn parse(header: &[u8; HEADER_LEN]) -> PackageResult<Self> {
        if &header[..MAGIC.len()] != MAGIC {
            return Err(corrupt("not a sigil package (bad magic)"));
        }
        let major = u16::from_le_bytes([header[6], header[7]]);
        let minor = u16::from_le_bytes([header[8], header[9]]);
        if major != VERSION_MAJOR {
            return Err(corrupt(&format!("unsupported format version {major}.{minor}")));
        }
        let timestamp = u32::from_le_bytes([header[10], header[11], header[12], header[13]]);
        let mut body_len = [0u8; 8];
        body_len.copy_from_slice(&header[14..SIGNED_HEADER_LEN]);
        let chain_len = u32::from_le_bytes([header[22], header[23], header[24], header[25]]);

        Ok(Self {
            major,
            minor,
            timestamp,
            body_len: u64::from_le_bytes(body_len),
            chain_len,
        })
    }
}

struct ChainBlock {
    chain: CertificateChain,
    signature: Vec<u8>,
}

impl ChainBlock {
    fn parse(block: &[u8]) -> PackageResult<Self> {
        let mut rest = block;

        let count = u32::from_le_bytes(take_array(&mut rest)?);
        if count == 0 || count > MAX_CHAIN_CERTS {
            return Err(PackageError::TruncatedSignature);
        }

        let mut certificates = Vec::new();
        for index in 0..count {
            let len = u32::from_le_bytes(take_array(&mut rest)?);
            let bytes = take(&mut rest, to_usize(u64::from(len))?)?;
            let cert = Certificate::decode(bytes)
                .map_err(|e| corrupt(&format!("certificate {index}: {e}")))?;
            certificates.push(cert);
        }

        let sig_len = u16::from_le_bytes(take_array(&mut rest)?);
        let signature = take(&mut rest, usize::from(sig_len))?.to_vec();
        if !rest.is_empty() {
            return Err(PackageError::TruncatedSignature);
        }

        Ok(Self {
            chain: CertificateChain::new(certificates),
            signature,
        })
    }
}

fn take<'a>(rest: &mut &'a [u8], n: usize) -> PackageResult<&'a [u8]> {
    if rest.len() < n {
        return Err(PackageError::TruncatedSignature);
    }
    let (head, tail) = rest.split_at(n);
    *rest = tail;
    Ok(head)
}

fn take_array<const N: usize>(rest: &mut &[u8]) -> PackageResult<[u8; N]> {
    take(rest, N)?
        .try_into()
        .map_err(|_| PackageError::TruncatedSignature)
}

fn hash_contents<R: Read + Seek>(
    reader: &mut R,
    header: &[u8; HEADER_LEN],
    body_start: u64,
    body_len: u64,
) -> PackageResult<sigil_crypto::ContentHash> {
    let mut hasher = StreamingHash::with_domain(SIGNATURE_DOMAIN);
    hasher.update(&header[..SIGNED_HEADER_LEN]);

    reader.seek(SeekFrom::Start(body_start))?;
    let mut body = reader.take(body_len);
    let mut buf = [0u8; HASH_CHUNK];
    loop {
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
    }

    if hasher.bytes_consumed() != (SIGNED_HEADER_LEN as u64).saturating_add(body_len) {
        return Err(corrupt("package body truncated"));
    }
    Ok(hasher.finalize())
}

fn check_range(offset: u64, size: u64, body_len: u64) -> PackageResult<()> {
    match offset.checked_add(size) {
        Some(end) if end <= body_len => Ok(()),
        _ => Err(corrupt("entry lies outside the package body")),
    }
}

fn to_usize(n: u64) -> PackageResult<usize> {
    usize::try_from(n).map_err(|_| corrupt("length exceeds address space"))
}

fn corrupt(message: &str) -> PackageError {
    PackageError::CorruptContainer(message.to_string())
}

fn eof_as(e: io::Error, f: impl FnOnce() -> PackageError) -> PackageError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        f()
    } else {
        PackageError::IoFailure(e)
    }
}

/// Signed-content digest for a package, used by the writer.
pub(crate) fn content_digest(header: &[u8], body: &[u8]) -> sigil_crypto::ContentHash {
    let mut hasher = StreamingHash::with_domain(SIGNATURE_DOMAIN);
    hasher.update(&header[..SIGNED_HEADER_LEN]).update(body);
    hasher.finalize()
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
