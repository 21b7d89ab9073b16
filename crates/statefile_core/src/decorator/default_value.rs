//! Default-value mapping decorator.
//!
//! Maps between an "empty / default" representation at the user boundary
//! and presence/absence at the inner persister. With the right options, a
//! caller that only ever sees concrete values can sit on top of storage
//! where "unset" is simply a missing file.

use crate::cancel::CancelToken;
use crate::error::PersistResult;
use crate::persister::{DataPersister, DataReader, UpdateFn};
use crate::result::{CorrelationTag, Equality, LoadResult, UpdateResult};
use crate::transaction::TransactionContext;
use std::ops::BitOr;

/// Bitmask of default-value mapping options.
///
/// Combine with `|`:
///
/// ```rust
/// use statefile_core::DefaultValueOptions;
///
/// let options = DefaultValueOptions::READ_EMPTY_TO_CUSTOM_DEFAULT
///     | DefaultValueOptions::WRITE_CUSTOM_DEFAULT_TO_EMPTY;
/// assert!(options.contains(DefaultValueOptions::READ_EMPTY_TO_CUSTOM_DEFAULT));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DefaultValueOptions(u8);

impl DefaultValueOptions {
    /// No mapping.
    pub const NONE: Self = Self(0);
    /// Surface an absent inner read as the custom default.
    pub const READ_EMPTY_TO_CUSTOM_DEFAULT: Self = Self(1 << 0);
    /// Surface an errored inner read as the custom default.
    pub const READ_ERROR_TO_CUSTOM_DEFAULT: Self = Self(1 << 1);
    /// Surface a stored value equal to the type zero as the custom default.
    pub const READ_DEFAULT_TO_CUSTOM_DEFAULT: Self = Self(1 << 2);
    /// Turn a commit of the type zero into a removal.
    pub const WRITE_DEFAULT_TO_EMPTY: Self = Self(1 << 3);
    /// Turn a commit of the custom default into a removal.
    pub const WRITE_CUSTOM_DEFAULT_TO_EMPTY: Self = Self(1 << 4);

    /// Returns true if every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both sets of flags.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl BitOr for DefaultValueOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Persister decorator that maps empty/default values at the boundary.
///
/// Read-side options rewrite what `load` (and the transaction context)
/// report; write-side options reinterpret committed values before they
/// reach the inner persister. The underlying file never stores the type
/// zero or the custom default when the corresponding write option is on -
/// those commits become removals.
pub struct DefaultValueDataPersister<T, P> {
    inner: P,
    options: DefaultValueOptions,
    custom_default: T,
    zero: T,
}

impl<T, P> DefaultValueDataPersister<T, P>
where
    T: Clone + Default + Send + Sync + 'static,
    P: DataPersister<T>,
{
    /// Wraps `inner` with the given options and custom default.
    ///
    /// The type zero used by the `*_DEFAULT_*` options is `T::default()`.
    pub fn new(inner: P, options: DefaultValueOptions, custom_default: T) -> Self {
        Self {
            inner,
            options,
            custom_default,
            zero: T::default(),
        }
    }

    /// Returns the wrapped persister.
    pub fn into_inner(self) -> P {
        self.inner
    }

    fn map_read(&self, result: LoadResult<T>) -> LoadResult<T> {
        let equality = self.inner.equality();

        let mapped = if result.is_error() {
            self.options
                .contains(DefaultValueOptions::READ_ERROR_TO_CUSTOM_DEFAULT)
        } else if result.is_absent() {
            self.options
                .contains(DefaultValueOptions::READ_EMPTY_TO_CUSTOM_DEFAULT)
        } else {
            self.options
                .contains(DefaultValueOptions::READ_DEFAULT_TO_CUSTOM_DEFAULT)
                && result
                    .value()
                    .is_some_and(|value| equality.eq(value, &self.zero))
        };

        if mapped {
            let tag = result.correlation_tag().cloned();
            LoadResult::present(self.custom_default.clone(), equality).with_correlation_tag(tag)
        } else {
            result
        }
    }

    /// Applies the write-side mapping: `None` means the commit becomes a
    /// removal at the inner persister.
    fn map_write(&self, value: T) -> Option<T> {
        let equality = self.inner.equality();
        if self
            .options
            .contains(DefaultValueOptions::WRITE_DEFAULT_TO_EMPTY)
            && equality.eq(&value, &self.zero)
        {
            return None;
        }
        if self
            .options
            .contains(DefaultValueOptions::WRITE_CUSTOM_DEFAULT_TO_EMPTY)
            && equality.eq(&value, &self.custom_default)
        {
            return None;
        }
        Some(value)
    }
}

impl<T, P> DataReader<T> for DefaultValueDataPersister<T, P>
where
    T: Clone + Default + Send + Sync + 'static,
    P: DataPersister<T>,
{
    fn load(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        Ok(self.map_read(self.inner.load(cancel)?))
    }

    fn is_data_constant(&self) -> bool {
        self.inner.is_data_constant()
    }

    fn equality(&self) -> Equality<T> {
        self.inner.equality()
    }
}

impl<T, P> DataPersister<T> for DefaultValueDataPersister<T, P>
where
    T: Clone + Default + Send + Sync + 'static,
    P: DataPersister<T>,
{
    fn update_with(
        &self,
        cancel: &CancelToken,
        correlation_tag: Option<CorrelationTag>,
        apply: &mut UpdateFn<'_, T>,
    ) -> PersistResult<UpdateResult<T>> {
        let mut wrapper = |inner_ctx: &mut TransactionContext<T>| -> PersistResult<()> {
            let mapped_read = self.map_read(inner_ctx.read().clone());
            let mut outer_ctx =
                TransactionContext::new(mapped_read, inner_ctx.correlation_tag().cloned());
            apply(&mut outer_ctx)?;

            if outer_ctx.is_removed() {
                inner_ctx.remove_and_commit();
            } else if outer_ctx.is_committed() {
                if let Some(value) = outer_ctx.take_committed_value() {
                    match self.map_write(value) {
                        Some(value) => inner_ctx.commit(value),
                        None => inner_ctx.remove_and_commit(),
                    }
                }
            }
            Ok(())
        };

        let result = self
            .inner
            .update_with(cancel, correlation_tag, &mut wrapper)?;

        // Re-apply the read mapping so the outward result matches what a
        // fresh load would report. Both halves are mapped so an unchanged
        // result still has `updated == previous`.
        let (is_updated, previous, updated) = result.into_parts();
        Ok(UpdateResult::new(
            is_updated,
            self.map_read(previous),
            self.map_read(updated),
        ))
    }
}
