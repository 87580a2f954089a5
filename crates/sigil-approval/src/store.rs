//! Signer approval map.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sigil_trust::VerifyVerdict;
use tracing::{debug, info};

use crate::error::{ApprovalError, ApprovalResult};
use crate::record::ApprovalRecord;

const FILE_VERSION: u32 = 1;

/// Approval records keyed by signer common name.
///
/// Owned by exactly one instance manager and mutated only from the thread
/// that drives it, so there is no internal locking.
///
/// # Example
///
/// ```
/// use sigil_approval::{ApprovalRecord, ApprovalStore};
/// use sigil_trust::VerifyVerdict;
///
/// let mut store = ApprovalStore::new();
/// store.record(ApprovalRecord::interactive("X", VerifyVerdict::SelfSigned, None));
/// assert!(store.covering("X", VerifyVerdict::SelfSigned).is_some());
/// ```
#[derive(Default, Clone)]
pub struct ApprovalStore {
    records: HashMap<String, ApprovalRecord>,
}

#[derive(Serialize, Deserialize)]
struct ApprovalFile {
    version: u32,
    approvals: Vec<ApprovalRecord>,
}

impl ApprovalStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The record covering `signer` under `verdict`, if any.
    #[must_use]
    pub fn covering(&self, signer: &str, verdict: VerifyVerdict) -> Option<&ApprovalRecord> {
        self.records
            .get(signer)
            .filter(|record| record.covers(signer, verdict))
    }

    /// Store or replace the record for its signer.
    ///
    /// Records that are not approvals, or that belong to unsigned packages,
    /// are not stored. Returns whether the record was stored.
    pub fn record(&mut self, record: ApprovalRecord) -> bool {
        if !record.approved
            || record.signer.is_empty()
            || record.verdict == VerifyVerdict::NoCertificate
        {
            debug!(signer = %record.signer, verdict = %record.verdict, "Approval not stored");
            return false;
        }

        info!(signer = %record.signer, verdict = %record.verdict, "Remembering approval");
        self.records.insert(record.signer.clone(), record);
        true
    }

    /// The record for `signer`, regardless of verdict.
    #[must_use]
    pub fn get(&self, signer: &str) -> Option<&ApprovalRecord> {
        self.records.get(signer)
    }

    /// Forget `signer`.
    pub fn revoke(&mut self, signer: &str) -> Option<ApprovalRecord> {
        let removed = self.records.remove(signer);
        if removed.is_some() {
            info!(signer, "Revoked approval");
        }
        removed
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, sorted by signer.
    #[must_use]
    pub fn records(&self) -> Vec<&ApprovalRecord> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_by(|a, b| a.signer.cmp(&b.signer));
        records
    }

    /// Load a store from a JSON file. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Io`] if the file cannot be read and
    /// [`ApprovalError::Format`] if it is not a valid approvals file.
    pub fn load(path: impl AsRef<Path>) -> ApprovalResult<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(io_error(path, &e)),
        };

        let file: ApprovalFile =
            serde_json::from_str(&text).map_err(|e| ApprovalError::Format(e.to_string()))?;
        if file.version != FILE_VERSION {
            return Err(ApprovalError::Format(format!(
                "unsupported approvals file version {}",
                file.version
            )));
        }

        let mut store = Self::new();
        for record in file.approvals {
            store.record(record);
        }
        debug!(path = %path.display(), count = store.len(), "Loaded approvals");
        Ok(store)
    }

    /// Write the store to a JSON file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::Io`] on write failure.
    pub fn save(&self, path: impl AsRef<Path>) -> ApprovalResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, &e))?;
        }

        let file = ApprovalFile {
            version: FILE_VERSION,
            approvals: self.records().into_iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ApprovalError::Format(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_error(&tmp, &e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_error(path, &e))?;
        debug!(path = %path.display(), count = self.len(), "Saved approvals");
        Ok(())
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> ApprovalError {
    ApprovalError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

impl fmt::Debug for ApprovalStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalStore")
            .field("count", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
