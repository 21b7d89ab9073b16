//! Lock-file acquisition and crash recovery.
//!
//! Acquiring the lock is the only way to touch the managed files. The lock
//! is an exclusive advisory lock on `P.lck`, retried with a linear back-off
//! that is interruptible by cancellation. Recovery runs immediately after
//! every acquisition, before any user-visible I/O, so all other logic can
//! assume the set is `{}` or `{COMMITTED}`.

use crate::cancel::CancelToken;
use crate::error::{PersistError, PersistResult};
use crate::file_set::FileSet;
use crate::settings::PersisterSettings;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Exclusive hold over a persister's file set.
///
/// Dropping the lock releases the advisory lock and deletes the lock file.
/// If the deletion fails the file is left behind; the next acquisition
/// simply reopens it.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
    file: Option<File>,
}

impl FileLock {
    /// Acquires the lock, retrying with linear back-off, then runs
    /// recovery on the managed files.
    ///
    /// Attempt `n` (1-based) waits `n * retry_delay` before the next try.
    /// The wait is interrupted the moment `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`PersistError::Cancelled`] if cancellation fires before the lock
    ///   is held; no file has been mutated in that case.
    /// - [`PersistError::LockUnavailable`] when every attempt found the
    ///   lock held elsewhere.
    /// - [`PersistError::Io`] for open or recovery failures.
    pub fn acquire(
        files: &FileSet,
        settings: &PersisterSettings,
        cancel: &CancelToken,
    ) -> PersistResult<Self> {
        let lock_path = files.lock_path().to_path_buf();
        let attempts = settings.num_retries.max(1);

        for attempt in 1..=attempts {
            cancel.checkpoint()?;

            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;

            if file.try_lock_exclusive().is_ok() {
                recover(files)?;
                return Ok(Self {
                    lock_path,
                    file: Some(file),
                });
            }
            drop(file);

            if attempt < attempts {
                let delay = settings.retry_delay * attempt;
                if cancel.wait_timeout(delay) {
                    return Err(PersistError::Cancelled);
                }
            }
        }

        Err(PersistError::lock_unavailable(
            lock_path.display().to_string(),
            attempts,
        ))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
            drop(file);
            if let Err(err) = fs::remove_file(&self.lock_path) {
                warn!(
                    path = %self.lock_path.display(),
                    error = %err,
                    "failed to delete lock file; next acquire will reuse it"
                );
            }
        }
    }
}

/// Reconciles the managed files into a consistent state.
///
/// 1. All three files exist: delete OLD, rename COMMITTED to OLD. NEW can
///    only exist once a writer finished staging it, so it is the latest
///    complete intent and COMMITTED is demoted in its favor.
/// 2. OLD and NEW exist: roll forward - rename NEW to COMMITTED.
/// 3. OLD and COMMITTED exist: delete OLD.
/// 4. NEW exists alone: roll back - delete NEW.
///
/// Postcondition: the set is `{}` or `{COMMITTED}`. Running recovery on an
/// already-consistent set changes nothing.
pub(crate) fn recover(files: &FileSet) -> PersistResult<()> {
    let mut state = files.state();
    let mut changed = false;

    if state.has_old && state.has_committed && state.has_new {
        debug!(path = %files.committed_path().display(), "recovery: demoting committed in favor of staged file");
        fs::remove_file(files.old_path())?;
        fs::rename(files.committed_path(), files.old_path())?;
        state.has_committed = false;
        changed = true;
    }

    if state.has_old && state.has_new {
        debug!(path = %files.committed_path().display(), "recovery: rolling forward staged file");
        fs::rename(files.new_path(), files.committed_path())?;
        state.has_new = false;
        state.has_committed = true;
        changed = true;
    }

    if state.has_old && state.has_committed {
        debug!(path = %files.committed_path().display(), "recovery: removing retired file");
        fs::remove_file(files.old_path())?;
        state.has_old = false;
        changed = true;
    }

    if state.has_new {
        debug!(path = %files.committed_path().display(), "recovery: rolling back staged file");
        fs::remove_file(files.new_path())?;
        changed = true;
    }

    if changed {
        files.sync_parent()?;
    }
    Ok(())
}
