//! The crash-safe file persister.
//!
//! Every operation follows the same shape: check the cancellation token,
//! take the in-process mutex, acquire the lock file (which runs recovery),
//! do the work, release in reverse order. The commit sequence stages the
//! next value in `P.new`, then pivots with renames; the first rename is
//! the durability point, after which recovery always rolls forward.

use crate::cancel::CancelToken;
use crate::codec::ValueCodec;
use crate::error::{PersistError, PersistResult};
use crate::file_set::FileSet;
use crate::lock::FileLock;
use crate::persister::{DataPersister, DataReader, UpdateFn};
use crate::result::{CorrelationTag, Equality, LoadResult, UpdateResult};
use crate::settings::PersisterSettings;
use crate::transaction::TransactionContext;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Retained state for exclusive mode.
///
/// The handle keeps the committed file open (with an exclusive advisory
/// lock) between operations; the cached result mirrors its contents. Both
/// are dropped before any write and re-established after a successful
/// commit, so the cache can never disagree with the file.
struct ExclusiveState<T> {
    handle: Option<File>,
    cached: Option<LoadResult<T>>,
}

/// Transactional persister for a single value in a single file.
///
/// Guarantees that despite crashes mid-write and concurrent access from
/// other processes using the same persister, the managed file set is
/// always left in a state that recovery resolves deterministically.
/// Consistency holds only when all access goes through this library.
///
/// # Example
///
/// ```rust,ignore
/// use statefile_core::{CancelToken, DataPersisterExt, FileDataPersister, JsonCodec};
/// use std::sync::Arc;
///
/// let persister: FileDataPersister<u64> =
///     FileDataPersister::new("/data/counter.json", Arc::new(JsonCodec));
/// let cancel = CancelToken::new();
///
/// persister.update(&cancel, None, |ctx| {
///     let next = ctx.read().value().copied().unwrap_or(0) + 1;
///     ctx.commit(next);
///     Ok(())
/// })?;
/// ```
pub struct FileDataPersister<T> {
    files: FileSet,
    codec: Arc<dyn ValueCodec<T>>,
    equality: Equality<T>,
    settings: PersisterSettings,
    state: Mutex<ExclusiveState<T>>,
}

impl<T> FileDataPersister<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a persister with structural equality and default settings.
    pub fn new(path: impl Into<PathBuf>, codec: Arc<dyn ValueCodec<T>>) -> Self
    where
        T: PartialEq,
    {
        Self {
            files: FileSet::new(path),
            codec,
            equality: Equality::structural(),
            settings: PersisterSettings::default(),
            state: Mutex::new(ExclusiveState {
                handle: None,
                cached: None,
            }),
        }
    }

    /// Replaces the equality comparer.
    #[must_use]
    pub fn with_equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: PersisterSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the path of the committed file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.files.committed_path()
    }

    /// Releases the exclusive-mode handle and forgets the cached value.
    ///
    /// Later operations re-open the file as needed. Dropping the persister
    /// has the same effect.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.handle = None;
        state.cached = None;
    }

    /// Reads the committed file, retaining handle and cache in exclusive
    /// mode. Caller must hold the in-process mutex and the file lock.
    fn read_committed(
        &self,
        cancel: &CancelToken,
        state: &mut ExclusiveState<T>,
    ) -> PersistResult<LoadResult<T>> {
        let path = self.files.committed_path();

        let mut options = OpenOptions::new();
        options.read(true);
        if self.settings.exclusive_mode {
            options.write(true);
        }

        let mut file = match options.open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(LoadResult::absent(self.equality.clone()));
            }
            Err(err) => {
                return Ok(LoadResult::error(err.into(), self.equality.clone()));
            }
        };

        let locked = if self.settings.exclusive_mode {
            file.try_lock_exclusive()
        } else {
            fs2::FileExt::try_lock_shared(&file)
        };
        if let Err(err) = locked {
            return Ok(LoadResult::error(err.into(), self.equality.clone()));
        }

        if let Err(err) = file.seek(SeekFrom::Start(0)) {
            return Ok(LoadResult::error(err.into(), self.equality.clone()));
        }

        match self.codec.read(cancel, &mut file) {
            Ok(value) => {
                let result = LoadResult::present(value, self.equality.clone());
                if self.settings.exclusive_mode {
                    state.handle = Some(file);
                    state.cached = Some(result.clone());
                }
                Ok(result)
            }
            Err(PersistError::Cancelled) => Err(PersistError::Cancelled),
            Err(err) => Ok(LoadResult::error(err, self.equality.clone())),
        }
    }

    /// Applies a committed transaction: removal or stage-and-pivot.
    ///
    /// The pivot itself contains no cancellation checkpoints; an error
    /// anywhere in here is captured by the caller and healed by the next
    /// acquisition's recovery.
    fn apply_commit(
        &self,
        cancel: &CancelToken,
        state: &mut ExclusiveState<T>,
        ctx: &mut TransactionContext<T>,
        read: &LoadResult<T>,
    ) -> PersistResult<UpdateResult<T>> {
        let committed_path = self.files.committed_path();

        if ctx.is_removed() {
            if committed_path.exists() {
                fs::remove_file(committed_path)?;
                self.files.sync_parent()?;
                let updated = LoadResult::absent(self.equality.clone())
                    .with_correlation_tag(ctx.correlation_tag().cloned());
                return Ok(UpdateResult::committed(read.clone(), updated));
            }
            ctx.reset();
            return Ok(UpdateResult::unchanged(read.clone()));
        }

        let value = match ctx.take_committed_value() {
            Some(value) => value,
            // The context API cannot produce a committed non-removal
            // without a value.
            None => return Ok(UpdateResult::unchanged(read.clone())),
        };

        let staging = self.files.new_path();
        {
            let mut file = File::create(staging)?;
            self.codec.write(cancel, &value, &mut file)?;
            file.sync_all()?;
        }

        // Commit pivot. The first rename is the durability point: once
        // OLD exists, recovery finishes the transition forward.
        if committed_path.exists() {
            fs::rename(committed_path, self.files.old_path())?;
            fs::rename(staging, committed_path)?;
            fs::remove_file(self.files.old_path())?;
        } else {
            fs::rename(staging, committed_path)?;
        }
        self.files.sync_parent()?;
        debug!(path = %committed_path.display(), "committed new value");

        let updated = LoadResult::present(value, self.equality.clone())
            .with_correlation_tag(ctx.correlation_tag().cloned());

        if self.settings.exclusive_mode {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(committed_path)?;
            file.try_lock_exclusive()?;
            state.handle = Some(file);
            state.cached = Some(updated.clone());
        }

        Ok(UpdateResult::committed(read.clone(), updated))
    }
}

impl<T> DataReader<T> for FileDataPersister<T>
where
    T: Clone + Send + 'static,
{
    fn load(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        cancel.checkpoint()?;
        let mut state = self.state.lock();

        let _lock = match FileLock::acquire(&self.files, &self.settings, cancel) {
            Ok(lock) => lock,
            Err(PersistError::Cancelled) => return Err(PersistError::Cancelled),
            Err(err) => return Ok(LoadResult::error(err, self.equality.clone())),
        };

        if let Some(cached) = state.cached.as_ref() {
            return Ok(cached.clone());
        }

        self.read_committed(cancel, &mut state)
    }

    fn equality(&self) -> Equality<T> {
        self.equality.clone()
    }
}

impl<T> DataPersister<T> for FileDataPersister<T>
where
    T: Clone + Send + 'static,
{
    fn update_with(
        &self,
        cancel: &CancelToken,
        correlation_tag: Option<CorrelationTag>,
        apply: &mut UpdateFn<'_, T>,
    ) -> PersistResult<UpdateResult<T>> {
        cancel.checkpoint()?;
        let mut state = self.state.lock();

        let _lock = match FileLock::acquire(&self.files, &self.settings, cancel) {
            Ok(lock) => lock,
            Err(PersistError::Cancelled) => return Err(PersistError::Cancelled),
            Err(err) => {
                let failure = LoadResult::error(err, self.equality.clone());
                return Ok(UpdateResult::failed(failure.clone(), failure));
            }
        };

        // A deserialize failure still produces a context; the callback
        // may choose to commit over it.
        let read = match state.cached.as_ref() {
            Some(cached) => cached.clone(),
            None => self.read_committed(cancel, &mut state)?,
        };

        let mut ctx = TransactionContext::new(read.clone(), correlation_tag);
        if let Err(err) = apply(&mut ctx) {
            if err.is_cancelled() {
                return Err(err);
            }
            let failure = LoadResult::error(err, self.equality.clone());
            return Ok(UpdateResult::failed(read, failure));
        }

        if !ctx.is_committed() {
            return Ok(UpdateResult::unchanged(read));
        }

        // Invalidate the exclusive-mode handle and cache before any write.
        state.handle = None;
        state.cached = None;

        match self.apply_commit(cancel, &mut state, &mut ctx, &read) {
            Ok(result) => Ok(result),
            Err(PersistError::Cancelled) => Err(PersistError::Cancelled),
            Err(err) => {
                let failure = LoadResult::error(err, self.equality.clone());
                Ok(UpdateResult::failed(read, failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::persister::DataPersisterExt;
    use std::time::Duration;
    use tempfile::tempdir;

    fn persister(path: &Path) -> FileDataPersister<i64> {
        FileDataPersister::new(path, Arc::new(JsonCodec))
    }

    fn shared_persister(path: &Path) -> FileDataPersister<i64> {
        persister(path).with_settings(PersisterSettings::new().exclusive_mode(false))
    }

    #[test]
    fn load_missing_file_is_absent() {
        let dir = tempdir().unwrap();
        let p = persister(&dir.path().join("value"));
        assert!(p.load(&CancelToken::new()).unwrap().is_absent());
    }

    #[test]
    fn fresh_commit_creates_committed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        let result = p
            .update(&cancel, None, |ctx| {
                assert!(ctx.read().is_absent());
                ctx.commit(42);
                Ok(())
            })
            .unwrap();

        assert!(result.is_updated());
        assert_eq!(result.updated().value(), Some(&42));
        assert!(path.exists());
        assert!(p.files.state().is_consistent());
        assert_eq!(p.load(&cancel).unwrap().value(), Some(&42));
    }

    #[test]
    fn overwrite_pivots_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        p.update(&cancel, None, |ctx| {
            ctx.commit(42);
            Ok(())
        })
        .unwrap();

        let result = p
            .update(&cancel, None, |ctx| {
                assert_eq!(ctx.read().value(), Some(&42));
                ctx.commit(43);
                Ok(())
            })
            .unwrap();

        assert!(result.is_updated());
        assert_eq!(result.previous().value(), Some(&42));
        assert_eq!(result.updated().value(), Some(&43));
        let state = p.files.state();
        assert!(state.is_consistent());
        assert!(state.has_committed);
    }

    #[test]
    fn write_elision_skips_disk_entirely() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = shared_persister(&path);
        let cancel = CancelToken::new();

        p.update(&cancel, None, |ctx| {
            ctx.commit(42);
            Ok(())
        })
        .unwrap();
        let bytes_before = fs::read(&path).unwrap();

        let result = p
            .update(&cancel, None, |ctx| {
                ctx.commit(42);
                Ok(())
            })
            .unwrap();

        assert!(!result.is_updated());
        assert_eq!(result.updated(), result.previous());
        assert_eq!(fs::read(&path).unwrap(), bytes_before);
        assert!(!p.files.new_path().exists());
    }

    #[test]
    fn remove_deletes_committed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        p.update(&cancel, None, |ctx| {
            ctx.commit(42);
            Ok(())
        })
        .unwrap();

        let result = p
            .update(&cancel, None, |ctx| {
                ctx.remove_and_commit();
                Ok(())
            })
            .unwrap();

        assert!(result.is_updated());
        assert!(result.updated().is_absent());
        assert!(!path.exists());
        assert!(p.load(&cancel).unwrap().is_absent());
    }

    #[test]
    fn remove_on_absent_makes_no_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        let result = p
            .update(&cancel, None, |ctx| {
                ctx.remove_and_commit();
                Ok(())
            })
            .unwrap();

        assert!(!result.is_updated());
        assert!(!path.exists());
        assert!(!p.files.new_path().exists());
        assert!(!p.files.old_path().exists());
    }

    #[test]
    fn durability_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let cancel = CancelToken::new();

        {
            let p = persister(&path);
            p.update(&cancel, None, |ctx| {
                ctx.commit(42);
                Ok(())
            })
            .unwrap();
            p.close();
        }

        let fresh = persister(&path);
        assert_eq!(fresh.load(&cancel).unwrap().value(), Some(&42));
    }

    #[test]
    fn exclusive_mode_serves_cached_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        p.update(&cancel, None, |ctx| {
            ctx.commit(42);
            Ok(())
        })
        .unwrap();

        // The file changes behind the persister's back; the exclusive-mode
        // cache is trusted over the file.
        fs::write(&path, b"99").unwrap();
        assert_eq!(p.load(&cancel).unwrap().value(), Some(&42));
    }

    #[test]
    fn close_releases_exclusive_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        p.update(&cancel, None, |ctx| {
            ctx.commit(1);
            Ok(())
        })
        .unwrap();
        p.close();

        // A second instance can now take its own exclusive handle.
        let other = persister(&path);
        assert_eq!(other.load(&cancel).unwrap().value(), Some(&1));
    }

    #[test]
    fn callback_error_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();

        p.update(&cancel, None, |ctx| {
            ctx.commit(42);
            Ok(())
        })
        .unwrap();

        let result = p
            .update(&cancel, None, |_ctx| Err(PersistError::callback("boom")))
            .unwrap();

        assert!(!result.is_updated());
        assert!(result.updated().is_error());
        assert_eq!(result.previous().value(), Some(&42));
        assert_eq!(p.load(&cancel).unwrap().value(), Some(&42));
    }

    #[test]
    fn cancelled_update_propagates_without_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = p.update(&cancel, None, |ctx| {
            ctx.commit(42);
            Ok(())
        });

        assert!(matches!(result, Err(PersistError::Cancelled)));
        assert!(!path.exists());
        assert!(!p.files.lock_path().exists());
    }

    #[test]
    fn corrupt_payload_read_is_captured_but_update_proceeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        fs::write(&path, b"not json").unwrap();

        let p = shared_persister(&path);
        let cancel = CancelToken::new();

        let result = p
            .update(&cancel, None, |ctx| {
                assert!(ctx.read().is_error());
                ctx.commit(7);
                Ok(())
            })
            .unwrap();

        assert!(result.is_updated());
        assert!(result.previous().is_error());
        assert_eq!(result.updated().value(), Some(&7));
        assert_eq!(p.load(&cancel).unwrap().value(), Some(&7));
    }

    #[test]
    fn lock_contention_is_captured_into_result() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("value");
        let p = persister(&path).with_settings(
            PersisterSettings::new()
                .num_retries(2)
                .retry_delay(Duration::from_millis(5)),
        );
        let cancel = CancelToken::new();

        let settings = PersisterSettings::new().num_retries(1);
        let _held = FileLock::acquire(&p.files, &settings, &cancel).unwrap();

        let result = p.load(&cancel).unwrap();
        assert!(result.is_error());
        assert!(matches!(
            result.captured_error(),
            Some(PersistError::LockUnavailable { .. })
        ));
    }

    #[test]
    fn correlation_tag_flows_to_updated_result() {
        let dir = tempdir().unwrap();
        let p = persister(&dir.path().join("value"));
        let cancel = CancelToken::new();

        let result = p
            .update(&cancel, Some(CorrelationTag::new("save-settings")), |ctx| {
                ctx.commit(1);
                Ok(())
            })
            .unwrap();

        let tag = result.updated().correlation_tag().unwrap();
        assert_eq!(tag.downcast_ref::<&str>(), Some(&"save-settings"));
    }
}
