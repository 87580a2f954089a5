//! Table-of-contents entries.

use std::path::{Component, Path, PathBuf};

/// One named byte range in a package body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadEntry {
    /// Logical file name, `/`-separated.
    pub name: String,
    /// Offset from the start of the package body.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
}

impl PayloadEntry {
    /// Relative filesystem path for this entry, if the name is safe to
    /// extract (relative, no `..`, no empty or root components).
    #[must_use]
    pub fn relative_path(&self) -> Option<PathBuf> {
        if self.name.is_empty() || self.name.contains('\\') || self.name.contains('\0') {
            return None;
        }

        let path = Path::new(&self.name);
        let mut out = PathBuf::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir
                | Component::ParentDir
                | Component::RootDir
                | Component::Prefix(_) => return None,
            }
        }

        if out.as_os_str().is_empty() {
            None
        } else {
            Some(out)
        }
    }
}
