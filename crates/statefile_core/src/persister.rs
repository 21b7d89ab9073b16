//! The reader and persister contracts.
//!
//! These traits are the seam between callers and storage. Implementations
//! must never fail an operation for expected conditions: a missing value is
//! an absent [`LoadResult`], a broken payload is a captured error inside
//! the result. The only `Err` an entry point may return is cancellation.

use crate::cancel::CancelToken;
use crate::error::PersistResult;
use crate::result::{CorrelationTag, Equality, LoadResult, UpdateResult};
use crate::transaction::TransactionContext;

/// The update callback: receives the transaction context and registers a
/// commit, a removal, or neither.
pub type UpdateFn<'a, T> = dyn FnMut(&mut TransactionContext<T>) -> PersistResult<()> + 'a;

/// Read-only access to a stored value.
pub trait DataReader<T>: Send + Sync {
    /// Loads the current value.
    ///
    /// Absence and captured failures are encoded in the [`LoadResult`].
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the operation is cancelled.
    fn load(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>>;

    /// Declares that the data behind this reader never changes.
    ///
    /// Consumers may memoize the first load. The file-backed reader and
    /// the versionable decorator rely on this for reference data.
    fn is_data_constant(&self) -> bool {
        false
    }

    /// The comparer this provider judges value equality with.
    fn equality(&self) -> Equality<T>;
}

/// Transactional read-modify-write access to a stored value.
pub trait DataPersister<T>: DataReader<T> {
    /// Performs an atomic update.
    ///
    /// The callback receives a [`TransactionContext`] built from the
    /// current read and must invoke [`TransactionContext::commit`],
    /// [`TransactionContext::remove_and_commit`], or neither. Failures
    /// inside the callback are captured into the updated half of the
    /// result; cancellation propagates.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the operation is cancelled.
    fn update_with(
        &self,
        cancel: &CancelToken,
        correlation_tag: Option<CorrelationTag>,
        apply: &mut UpdateFn<'_, T>,
    ) -> PersistResult<UpdateResult<T>>;
}

/// Closure-friendly sugar over [`DataPersister::update_with`].
pub trait DataPersisterExt<T>: DataPersister<T> {
    /// Performs an atomic update with a generic closure.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the operation is cancelled.
    fn update<F>(
        &self,
        cancel: &CancelToken,
        correlation_tag: Option<CorrelationTag>,
        mut apply: F,
    ) -> PersistResult<UpdateResult<T>>
    where
        F: FnMut(&mut TransactionContext<T>) -> PersistResult<()>,
    {
        self.update_with(cancel, correlation_tag, &mut apply)
    }
}

impl<T, P: DataPersister<T> + ?Sized> DataPersisterExt<T> for P {}
