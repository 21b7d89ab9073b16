//! In-memory persister for testing and ephemeral storage.

use crate::cancel::CancelToken;
use crate::error::PersistResult;
use crate::persister::{DataPersister, DataReader, UpdateFn};
use crate::result::{CorrelationTag, Equality, LoadResult, UpdateResult};
use crate::transaction::TransactionContext;
use parking_lot::Mutex;

/// A persister holding its value in memory.
///
/// Implements the full [`DataPersister`] contract - commit semantics,
/// write elision, correlation tags, captured callback failures - without
/// touching disk. Suitable for unit tests and as the inner persister under
/// decorators.
///
/// # Example
///
/// ```rust
/// use statefile_core::{CancelToken, DataPersisterExt, DataReader, MemoryDataPersister};
///
/// let persister = MemoryDataPersister::new();
/// let cancel = CancelToken::new();
///
/// let result = persister
///     .update(&cancel, None, |ctx| {
///         ctx.commit(42);
///         Ok(())
///     })
///     .unwrap();
/// assert!(result.is_updated());
/// assert_eq!(persister.load(&cancel).unwrap().value(), Some(&42));
/// ```
pub struct MemoryDataPersister<T> {
    slot: Mutex<Option<T>>,
    equality: Equality<T>,
}

impl<T> MemoryDataPersister<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty persister with structural equality.
    #[must_use]
    pub fn new() -> Self
    where
        T: PartialEq,
    {
        Self {
            slot: Mutex::new(None),
            equality: Equality::structural(),
        }
    }

    /// Creates a persister seeded with a value.
    #[must_use]
    pub fn with_value(value: T) -> Self
    where
        T: PartialEq,
    {
        Self {
            slot: Mutex::new(Some(value)),
            equality: Equality::structural(),
        }
    }

    /// Replaces the equality comparer.
    #[must_use]
    pub fn with_equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    fn snapshot(&self, slot: &Option<T>) -> LoadResult<T> {
        match slot {
            Some(value) => LoadResult::present(value.clone(), self.equality.clone()),
            None => LoadResult::absent(self.equality.clone()),
        }
    }
}

impl<T> Default for MemoryDataPersister<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DataReader<T> for MemoryDataPersister<T>
where
    T: Clone + Send + 'static,
{
    fn load(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        cancel.checkpoint()?;
        Ok(self.snapshot(&self.slot.lock()))
    }

    fn equality(&self) -> Equality<T> {
        self.equality.clone()
    }
}

impl<T> DataPersister<T> for MemoryDataPersister<T>
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
        let mut slot = self.slot.lock();
        let read = self.snapshot(&slot);

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

        if ctx.is_removed() {
            if slot.is_some() {
                *slot = None;
                let updated = LoadResult::absent(self.equality.clone())
                    .with_correlation_tag(ctx.correlation_tag().cloned());
                return Ok(UpdateResult::committed(read, updated));
            }
            ctx.reset();
            return Ok(UpdateResult::unchanged(read));
        }

        match ctx.take_committed_value() {
            Some(value) => {
                *slot = Some(value.clone());
                let updated = LoadResult::present(value, self.equality.clone())
                    .with_correlation_tag(ctx.correlation_tag().cloned());
                Ok(UpdateResult::committed(read, updated))
            }
            None => Ok(UpdateResult::unchanged(read)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use crate::persister::DataPersisterExt;

    #[test]
    fn empty_persister_loads_absent() {
        let persister: MemoryDataPersister<i64> = MemoryDataPersister::new();
        let result = persister.load(&CancelToken::new()).unwrap();
        assert!(result.is_absent());
    }

    #[test]
    fn commit_then_load() {
        let persister = MemoryDataPersister::new();
        let cancel = CancelToken::new();

        let result = persister
            .update(&cancel, None, |ctx| {
                assert!(ctx.read().is_absent());
                ctx.commit(10);
                Ok(())
            })
            .unwrap();

        assert!(result.is_updated());
        assert_eq!(result.updated().value(), Some(&10));
        assert_eq!(persister.load(&cancel).unwrap().value(), Some(&10));
    }

    #[test]
    fn write_elision_on_equal_commit() {
        let persister = MemoryDataPersister::with_value(10);
        let cancel = CancelToken::new();

        let result = persister
            .update(&cancel, None, |ctx| {
                ctx.commit(10);
                Ok(())
            })
            .unwrap();

        assert!(!result.is_updated());
        assert_eq!(result.updated(), result.previous());
    }

    #[test]
    fn remove_clears_value() {
        let persister = MemoryDataPersister::with_value(10);
        let cancel = CancelToken::new();

        let result = persister
            .update(&cancel, None, |ctx| {
                ctx.remove_and_commit();
                Ok(())
            })
            .unwrap();

        assert!(result.is_updated());
        assert!(result.updated().is_absent());
        assert!(persister.load(&cancel).unwrap().is_absent());
    }

    #[test]
    fn remove_on_empty_is_noop() {
        let persister: MemoryDataPersister<i64> = MemoryDataPersister::new();
        let cancel = CancelToken::new();

        let result = persister
            .update(&cancel, None, |ctx| {
                ctx.remove_and_commit();
                Ok(())
            })
            .unwrap();

        assert!(!result.is_updated());
        assert!(persister.load(&cancel).unwrap().is_absent());
    }

    #[test]
    fn callback_failure_is_captured() {
        let persister = MemoryDataPersister::with_value(10);
        let cancel = CancelToken::new();

        let result = persister
            .update(&cancel, None, |_ctx| Err(PersistError::callback("nope")))
            .unwrap();

        assert!(!result.is_updated());
        assert!(result.updated().is_error());
        assert_eq!(result.previous().value(), Some(&10));
        // The stored value is untouched.
        assert_eq!(persister.load(&cancel).unwrap().value(), Some(&10));
    }

    #[test]
    fn cancellation_propagates_from_callback() {
        let persister = MemoryDataPersister::with_value(10);
        let cancel = CancelToken::new();

        let result = persister.update(&cancel, None, |_ctx| Err(PersistError::Cancelled));
        assert!(matches!(result, Err(PersistError::Cancelled)));
    }

    #[test]
    fn correlation_tag_lands_on_updated_result() {
        let persister = MemoryDataPersister::new();
        let cancel = CancelToken::new();

        let result = persister
            .update(&cancel, Some(CorrelationTag::new(7u32)), |ctx| {
                ctx.commit(1);
                Ok(())
            })
            .unwrap();

        let tag = result.updated().correlation_tag().unwrap();
        assert_eq!(tag.downcast_ref::<u32>(), Some(&7));
    }
}
