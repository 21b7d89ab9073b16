//! Format-version migration decorator.
//!
//! Compares a writable persister's value against an immutable reference
//! value and prefers the reference when its format version differs. The
//! next committed write then persists the reference's shape locally, so a
//! bumped reference version is always migrated without ever leaving the
//! transactional path.

use crate::cancel::CancelToken;
use crate::error::PersistResult;
use crate::persister::{DataPersister, DataReader, UpdateFn};
use crate::result::{CorrelationTag, Equality, LoadResult, UpdateResult};
use crate::transaction::TransactionContext;
use parking_lot::Mutex;

/// A value with a format version on its serialized shape.
pub trait Versioned {
    /// The version of this value's serialized form.
    fn format_version(&self) -> u64;
}

/// Persister decorator that prefers a reference value on version change.
///
/// `load` reads both sources and returns the reference when
/// [`should_use_reference`] holds; otherwise the local value. `update`
/// seeds the transaction with the reference read in that case, so the
/// callback works against the canonical shape and its commit lands in the
/// local file atomically.
///
/// The reference load is memoized when the reader declares its data
/// constant.
///
/// [`should_use_reference`]: VersionableDataPersister::should_use_reference
pub struct VersionableDataPersister<T, P, R> {
    inner: P,
    reference: R,
    memo: Mutex<Option<LoadResult<T>>>,
}

impl<T, P, R> VersionableDataPersister<T, P, R>
where
    T: Versioned + Clone + Send + 'static,
    P: DataPersister<T>,
    R: DataReader<T>,
{
    /// Wraps a writable persister and an immutable reference reader.
    pub fn new(inner: P, reference: R) -> Self {
        Self {
            inner,
            reference,
            memo: Mutex::new(None),
        }
    }

    /// Returns the wrapped persister.
    pub fn into_inner(self) -> P {
        self.inner
    }

    /// True iff the reference is present and the local value is absent or
    /// carries a different format version. An errored local read is never
    /// overridden: the error surfaces as-is.
    #[must_use]
    pub fn should_use_reference(reference: &LoadResult<T>, local: &LoadResult<T>) -> bool {
        let Some(reference_value) = reference.value() else {
            return false;
        };
        match local.value() {
            Some(local_value) => {
                local_value.format_version() != reference_value.format_version()
            }
            None => local.is_absent(),
        }
    }

    fn load_reference(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        if self.reference.is_data_constant() {
            if let Some(memoized) = self.memo.lock().as_ref() {
                return Ok(memoized.clone());
            }
        }

        let result = self.reference.load(cancel)?;

        if self.reference.is_data_constant() && !result.is_error() {
            *self.memo.lock() = Some(result.clone());
        }
        Ok(result)
    }
}

impl<T, P, R> DataReader<T> for VersionableDataPersister<T, P, R>
where
    T: Versioned + Clone + Send + 'static,
    P: DataPersister<T>,
    R: DataReader<T>,
{
    fn load(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        let reference = self.load_reference(cancel)?;
        let local = self.inner.load(cancel)?;

        if Self::should_use_reference(&reference, &local) {
            Ok(reference)
        } else {
            Ok(local)
        }
    }

    fn equality(&self) -> Equality<T> {
        self.inner.equality()
    }
}

impl<T, P, R> DataPersister<T> for VersionableDataPersister<T, P, R>
where
    T: Versioned + Clone + Send + 'static,
    P: DataPersister<T>,
    R: DataReader<T>,
{
    fn update_with(
        &self,
        cancel: &CancelToken,
        correlation_tag: Option<CorrelationTag>,
        apply: &mut UpdateFn<'_, T>,
    ) -> PersistResult<UpdateResult<T>> {
        let reference = self.load_reference(cancel)?;

        let mut wrapper = |ctx: &mut TransactionContext<T>| -> PersistResult<()> {
            if !Self::should_use_reference(&reference, ctx.read()) {
                return apply(ctx);
            }

            // Hand the callback a context seeded with the reference read;
            // mirror its outcome onto the real context so the commit still
            // pivots through the local file.
            let mut reference_ctx =
                TransactionContext::new(reference.clone(), ctx.correlation_tag().cloned());
            apply(&mut reference_ctx)?;

            if reference_ctx.is_removed() {
                ctx.remove_and_commit();
            } else if reference_ctx.is_committed() {
                if let Some(value) = reference_ctx.take_committed_value() {
                    ctx.commit(value);
                }
            }
            Ok(())
        };

        self.inner.update_with(cancel, correlation_tag, &mut wrapper)
    }
}
