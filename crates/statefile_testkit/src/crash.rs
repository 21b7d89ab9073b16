//! Crash-state seeding for recovery testing.
//!
//! A crash mid-update leaves some combination of the committed, staged,
//! and retired files behind. This module writes those combinations
//! directly, so tests can hand a persister any post-crash layout and
//! assert what recovery makes of it.
//!
//! ## Test strategy
//!
//! 1. **Crash after the first pivot rename** - `{OLD, NEW}` rolls forward
//! 2. **Crash after staging, before the pivot** - `{COMMITTED, NEW}` rolls
//!    back
//! 3. **Anomalous three-file state** - `{OLD, COMMITTED, NEW}` keeps NEW
//! 4. **Crash after the second rename** - `{OLD, COMMITTED}` drops OLD

use statefile_core::FileSet;
use std::fs;
use std::path::Path;

/// An on-disk layout to seed before opening a persister.
///
/// Each slot holds the raw bytes to write, or `None` to leave the file
/// absent.
#[derive(Debug, Clone, Default)]
pub struct CrashState {
    /// Bytes for `P.old`.
    pub old: Option<Vec<u8>>,
    /// Bytes for `P` (committed).
    pub committed: Option<Vec<u8>>,
    /// Bytes for `P.new`.
    pub new: Option<Vec<u8>>,
}

impl CrashState {
    /// `{OLD, NEW}`: a crash between the two pivot renames. Recovery must
    /// roll forward to the staged value.
    #[must_use]
    pub fn mid_pivot(old: &[u8], new: &[u8]) -> Self {
        Self {
            old: Some(old.to_vec()),
            committed: None,
            new: Some(new.to_vec()),
        }
    }

    /// `{COMMITTED, NEW}`: a crash after staging but before the pivot.
    /// Recovery must roll back, keeping the committed value.
    #[must_use]
    pub fn staged_only(committed: &[u8], new: &[u8]) -> Self {
        Self {
            old: None,
            committed: Some(committed.to_vec()),
            new: Some(new.to_vec()),
        }
    }

    /// `{OLD, COMMITTED}`: a crash after the second rename but before OLD
    /// was deleted. Recovery must drop OLD.
    #[must_use]
    pub fn retired_left_behind(old: &[u8], committed: &[u8]) -> Self {
        Self {
            old: Some(old.to_vec()),
            committed: Some(committed.to_vec()),
            new: None,
        }
    }

    /// `{OLD, COMMITTED, NEW}`: the anomalous three-file state. Recovery
    /// keeps NEW as the most recent writer's intent.
    #[must_use]
    pub fn three_files(old: &[u8], committed: &[u8], new: &[u8]) -> Self {
        Self {
            old: Some(old.to_vec()),
            committed: Some(committed.to_vec()),
            new: Some(new.to_vec()),
        }
    }
}

/// Writes a crash state onto the managed file set for `base`.
///
/// Existing managed files are removed first, so the resulting layout is
/// exactly the given state.
///
/// # Panics
///
/// Panics on I/O failure; this is test scaffolding.
pub fn seed_crash_state(base: &Path, state: &CrashState) {
    let files = FileSet::new(base);

    for path in [files.old_path(), files.committed_path(), files.new_path()] {
        if path.exists() {
            fs::remove_file(path).expect("failed to clear managed file");
        }
    }

    if let Some(bytes) = &state.old {
        fs::write(files.old_path(), bytes).expect("failed to seed old file");
    }
    if let Some(bytes) = &state.committed {
        fs::write(files.committed_path(), bytes).expect("failed to seed committed file");
    }
    if let Some(bytes) = &state.new {
        fs::write(files.new_path(), bytes).expect("failed to seed new file");
    }
}

/// Reads back which managed files exist and what they contain.
///
/// # Panics
///
/// Panics on I/O failure; this is test scaffolding.
#[must_use]
pub fn observe_files(base: &Path) -> CrashState {
    let files = FileSet::new(base);
    let read = |path: &Path| -> Option<Vec<u8>> {
        path.exists().then(|| fs::read(path).expect("failed to read managed file"))
    };

    CrashState {
        old: read(files.old_path()),
        committed: read(files.committed_path()),
        new: read(files.new_path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn seed_and_observe_round_trip() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("value");

        seed_crash_state(&base, &CrashState::mid_pivot(b"42", b"43"));

        let observed = observe_files(&base);
        assert_eq!(observed.old.as_deref(), Some(b"42".as_slice()));
        assert!(observed.committed.is_none());
        assert_eq!(observed.new.as_deref(), Some(b"43".as_slice()));
    }

    #[test]
    fn seeding_replaces_previous_layout() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("value");

        seed_crash_state(&base, &CrashState::three_files(b"1", b"2", b"3"));
        seed_crash_state(&base, &CrashState::staged_only(b"42", b"43"));

        let observed = observe_files(&base);
        assert!(observed.old.is_none());
        assert_eq!(observed.committed.as_deref(), Some(b"42".as_slice()));
        assert_eq!(observed.new.as_deref(), Some(b"43".as_slice()));
    }
}
