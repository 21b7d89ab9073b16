//! Immutable result records for load and update operations.
//!
//! A [`LoadResult`] carries exactly one of three states: a present value,
//! an absent value, or a captured error. Failures travel inside the record
//! rather than as a live error so that results stay cloneable and can be
//! cached; only cancellation ever propagates as `Err`.

use crate::error::PersistError;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Equality comparer for stored values.
///
/// Used for change detection inside [`crate::TransactionContext::commit`]
/// (write elision) and for [`LoadResult`] equality. The default is
/// structural equality via `PartialEq`; callers with looser or stricter
/// notions of sameness supply their own with [`Equality::by`].
pub struct Equality<T> {
    eq: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            eq: Arc::clone(&self.eq),
        }
    }
}

impl<T> Equality<T> {
    /// Creates a comparer from a closure.
    pub fn by(f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Self { eq: Arc::new(f) }
    }

    /// Compares two values.
    #[must_use]
    pub fn eq(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }
}

impl<T: PartialEq> Equality<T> {
    /// Structural equality via `PartialEq`.
    #[must_use]
    pub fn structural() -> Self
    where
        T: 'static,
    {
        Self::by(|a, b| a == b)
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equality")
    }
}

/// Opaque caller-supplied tag threaded through results.
///
/// Lets callers match an update back to its originating intent. Tags are
/// runtime-only: they are never persisted and do not survive a process
/// restart.
#[derive(Clone)]
pub struct CorrelationTag(Arc<dyn Any + Send + Sync>);

impl CorrelationTag {
    /// Wraps an arbitrary value as a tag.
    pub fn new<V: Any + Send + Sync>(value: V) -> Self {
        Self(Arc::new(value))
    }

    /// Attempts to borrow the tag as a concrete type.
    #[must_use]
    pub fn downcast_ref<V: Any>(&self) -> Option<&V> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for CorrelationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CorrelationTag")
    }
}

#[derive(Debug, Clone)]
enum LoadState<T> {
    Present(T),
    Absent,
    Error(Arc<PersistError>),
}

/// Result of loading the persisted value.
///
/// # Invariants
///
/// - `Present`: no error, value populated
/// - `Absent`: no error, no value
/// - `Error`: a captured error, no value
///
/// Equality compares presence, error-ness, and - when both sides are
/// present - the values under this result's comparer. Error identity is
/// deliberately not part of equality.
#[derive(Debug, Clone)]
pub struct LoadResult<T> {
    state: LoadState<T>,
    correlation_tag: Option<CorrelationTag>,
    equality: Equality<T>,
}

impl<T> LoadResult<T> {
    /// Creates a result carrying a value.
    #[must_use]
    pub fn present(value: T, equality: Equality<T>) -> Self {
        Self {
            state: LoadState::Present(value),
            correlation_tag: None,
            equality,
        }
    }

    /// Creates a result for a value that is not stored.
    #[must_use]
    pub fn absent(equality: Equality<T>) -> Self {
        Self {
            state: LoadState::Absent,
            correlation_tag: None,
            equality,
        }
    }

    /// Creates a result carrying a captured failure.
    #[must_use]
    pub fn error(error: PersistError, equality: Equality<T>) -> Self {
        Self {
            state: LoadState::Error(Arc::new(error)),
            correlation_tag: None,
            equality,
        }
    }

    /// Attaches a correlation tag, replacing any existing one.
    #[must_use]
    pub fn with_correlation_tag(mut self, tag: Option<CorrelationTag>) -> Self {
        self.correlation_tag = tag;
        self
    }

    /// Returns true if a value is present.
    #[must_use]
    pub fn is_present(&self) -> bool {
        matches!(self.state, LoadState::Present(_))
    }

    /// Returns true if no value is stored.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self.state, LoadState::Absent)
    }

    /// Returns true if a failure was captured.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.state, LoadState::Error(_))
    }

    /// Borrows the value, if present.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match &self.state {
            LoadState::Present(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the result and returns the value, if present.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self.state {
            LoadState::Present(value) => Some(value),
            _ => None,
        }
    }

    /// Borrows the captured error, if any.
    #[must_use]
    pub fn captured_error(&self) -> Option<&PersistError> {
        match &self.state {
            LoadState::Error(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    /// Borrows the correlation tag, if one was attached.
    #[must_use]
    pub fn correlation_tag(&self) -> Option<&CorrelationTag> {
        self.correlation_tag.as_ref()
    }

    /// Returns the comparer this result judges equality with.
    #[must_use]
    pub fn equality(&self) -> &Equality<T> {
        &self.equality
    }
}

impl<T> PartialEq for LoadResult<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.is_present() != other.is_present() || self.is_error() != other.is_error() {
            return false;
        }
        match (self.value(), other.value()) {
            (Some(a), Some(b)) => self.equality.eq(a, b),
            _ => true,
        }
    }
}

/// Result of a transactional update.
///
/// If [`is_updated`] is false, `updated` equals `previous`; if true,
/// `updated` reflects the committed state, which may be absent after a
/// removal.
///
/// [`is_updated`]: UpdateResult::is_updated
#[derive(Debug, Clone)]
pub struct UpdateResult<T> {
    is_updated: bool,
    previous: LoadResult<T>,
    updated: LoadResult<T>,
}

impl<T> UpdateResult<T> {
    pub(crate) fn new(is_updated: bool, previous: LoadResult<T>, updated: LoadResult<T>) -> Self {
        Self {
            is_updated,
            previous,
            updated,
        }
    }

    /// An update that made no change; both halves are the read snapshot.
    #[must_use]
    pub fn unchanged(read: LoadResult<T>) -> Self
    where
        T: Clone,
    {
        Self {
            is_updated: false,
            previous: read.clone(),
            updated: read,
        }
    }

    /// An update that committed a new state.
    #[must_use]
    pub fn committed(previous: LoadResult<T>, updated: LoadResult<T>) -> Self {
        Self {
            is_updated: true,
            previous,
            updated,
        }
    }

    /// An update that failed; the failure is captured on the updated half.
    #[must_use]
    pub fn failed(previous: LoadResult<T>, failure: LoadResult<T>) -> Self {
        Self {
            is_updated: false,
            previous,
            updated: failure,
        }
    }

    /// Returns true if a new state was committed.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        self.is_updated
    }

    /// The snapshot read before the update.
    #[must_use]
    pub fn previous(&self) -> &LoadResult<T> {
        &self.previous
    }

    /// The state after the update (equal to `previous` when nothing
    /// changed, an error when the update failed).
    #[must_use]
    pub fn updated(&self) -> &LoadResult<T> {
        &self.updated
    }

    /// Consumes the result into `(is_updated, previous, updated)`.
    #[must_use]
    pub fn into_parts(self) -> (bool, LoadResult<T>, LoadResult<T>) {
        (self.is_updated, self.previous, self.updated)
    }
}
