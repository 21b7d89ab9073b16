//! The managed on-disk file set.
//!
//! A persister for base path `P` manages exactly four files:
//!
//! ```text
//! P          # COMMITTED - last durable value
//! P.new      # NEW - staged next value, not yet durable
//! P.old      # OLD - previous committed, present only during the pivot
//! P.lck      # LOCK - exclusive-open sentinel held during any operation
//! ```
//!
//! Between operations (after lock release) the set of existing files in
//! `{P, P.new, P.old}` is either empty or `{P}`. Any other combination is
//! the footprint of an interrupted update and is resolved by recovery at
//! the next lock acquisition.

use std::io;
use std::path::{Path, PathBuf};

const NEW_SUFFIX: &str = ".new";
const OLD_SUFFIX: &str = ".old";
const LOCK_SUFFIX: &str = ".lck";

/// Paths of the four managed files for one base path.
#[derive(Debug, Clone)]
pub struct FileSet {
    committed: PathBuf,
    new: PathBuf,
    old: PathBuf,
    lock: PathBuf,
}

impl FileSet {
    /// Creates the file set for a base path.
    ///
    /// Suffixes are appended to the full file name, so `value.json`
    /// produces `value.json.new`, not `value.new`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let committed = base.into();
        Self {
            new: append_suffix(&committed, NEW_SUFFIX),
            old: append_suffix(&committed, OLD_SUFFIX),
            lock: append_suffix(&committed, LOCK_SUFFIX),
            committed,
        }
    }

    /// Path of the committed value.
    #[must_use]
    pub fn committed_path(&self) -> &Path {
        &self.committed
    }

    /// Path of the staged next value.
    #[must_use]
    pub fn new_path(&self) -> &Path {
        &self.new
    }

    /// Path of the previous committed value during the pivot.
    #[must_use]
    pub fn old_path(&self) -> &Path {
        &self.old
    }

    /// Path of the lock sentinel.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    /// Probes which managed data files currently exist.
    #[must_use]
    pub fn state(&self) -> FileSetState {
        FileSetState {
            has_old: self.old.exists(),
            has_committed: self.committed.exists(),
            has_new: self.new.exists(),
        }
    }

    /// Syncs the parent directory so renames and deletions are durable.
    ///
    /// On non-unix targets the filesystem journal covers metadata
    /// durability and this is a no-op.
    #[cfg(unix)]
    pub fn sync_parent(&self) -> io::Result<()> {
        if let Some(parent) = self.committed.parent() {
            if !parent.as_os_str().is_empty() {
                let dir = std::fs::File::open(parent)?;
                dir.sync_all()?;
            }
        }
        Ok(())
    }

    /// Syncs the parent directory so renames and deletions are durable.
    #[cfg(not(unix))]
    pub fn sync_parent(&self) -> io::Result<()> {
        Ok(())
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Existence snapshot of the three data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSetState {
    /// Whether `P.old` exists.
    pub has_old: bool,
    /// Whether `P` exists.
    pub has_committed: bool,
    /// Whether `P.new` exists.
    pub has_new: bool,
}

impl FileSetState {
    /// True when the set satisfies the between-operations invariant:
    /// either no files, or the committed file alone.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        !self.has_old && !self.has_new
    }
}
