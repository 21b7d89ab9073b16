//! Transactional update context.

use crate::result::{CorrelationTag, LoadResult};

/// Mutable context handed to the update callback.
///
/// The context carries the snapshot read before the update and records the
/// caller's intent: [`commit`] a value, [`remove_and_commit`] the stored
/// value, or neither. After the callback returns, the persister examines
/// [`is_committed`] to decide whether any disk mutation happens at all.
///
/// Committing a value that equals the read value under the provider's
/// comparer is a no-op; the persister uses this as a write-elision signal,
/// so an idempotent update never touches the file.
///
/// [`commit`]: TransactionContext::commit
/// [`remove_and_commit`]: TransactionContext::remove_and_commit
/// [`is_committed`]: TransactionContext::is_committed
#[derive(Debug)]
pub struct TransactionContext<T> {
    read: LoadResult<T>,
    correlation_tag: Option<CorrelationTag>,
    committed_value: Option<T>,
    is_committed: bool,
    is_removed: bool,
}

impl<T> TransactionContext<T> {
    /// Creates a context from the read snapshot and the caller's tag.
    #[must_use]
    pub fn new(read: LoadResult<T>, correlation_tag: Option<CorrelationTag>) -> Self {
        Self {
            read,
            correlation_tag,
            committed_value: None,
            is_committed: false,
            is_removed: false,
        }
    }

    /// The snapshot read before the update.
    #[must_use]
    pub fn read(&self) -> &LoadResult<T> {
        &self.read
    }

    /// The tag the caller supplied for this update.
    ///
    /// On a successful commit it becomes the correlation tag of the
    /// updated [`LoadResult`].
    #[must_use]
    pub fn correlation_tag(&self) -> Option<&CorrelationTag> {
        self.correlation_tag.as_ref()
    }

    /// Commits `value` as the next state.
    ///
    /// Sets `is_committed` to whether `value` differs from the read value
    /// under the provider's comparer, and clears any pending removal. A
    /// read that was absent or errored always counts as different.
    pub fn commit(&mut self, value: T) {
        self.is_committed = match self.read.value() {
            Some(previous) => !self.read.equality().eq(previous, &value),
            None => true,
        };
        self.is_removed = false;
        self.committed_value = Some(value);
    }

    /// Commits `Some(value)` as [`commit`], `None` as
    /// [`remove_and_commit`].
    ///
    /// [`commit`]: TransactionContext::commit
    /// [`remove_and_commit`]: TransactionContext::remove_and_commit
    pub fn commit_option(&mut self, value: Option<T>) {
        match value {
            Some(value) => self.commit(value),
            None => self.remove_and_commit(),
        }
    }

    /// Requests removal of the stored value.
    ///
    /// A no-op (does not set `is_committed`) when the read was already
    /// absent or errored.
    pub fn remove_and_commit(&mut self) {
        self.is_removed = true;
        self.is_committed = self.read.is_present();
        self.committed_value = None;
    }

    /// Returns the context to the uncommitted state.
    pub fn reset(&mut self) {
        self.committed_value = None;
        self.is_committed = false;
        self.is_removed = false;
    }

    /// Whether the callback committed a change that must be applied.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.is_committed
    }

    /// Whether the committed change is a removal.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.is_removed
    }

    /// Borrows the value passed to the last [`commit`], if any.
    ///
    /// [`commit`]: TransactionContext::commit
    #[must_use]
    pub fn committed_value(&self) -> Option<&T> {
        self.committed_value.as_ref()
    }

    /// Takes the committed value out of the context.
    pub(crate) fn take_committed_value(&mut self) -> Option<T> {
        self.committed_value.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Equality;

    fn eq() -> Equality<i64> {
        Equality::structural()
    }

    fn present(value: i64) -> LoadResult<i64> {
        LoadResult::present(value, eq())
    }

    #[test]
    fn commit_new_value_marks_committed() {
        let mut ctx = TransactionContext::new(present(1), None);
        ctx.commit(2);
        assert!(ctx.is_committed());
        assert!(!ctx.is_removed());
        assert_eq!(ctx.committed_value(), Some(&2));
    }

    #[test]
    fn commit_equal_value_elides_write() {
        let mut ctx = TransactionContext::new(present(1), None);
        ctx.commit(1);
        assert!(!ctx.is_committed());
        assert_eq!(ctx.committed_value(), Some(&1));
    }

    #[test]
    fn commit_on_absent_read_always_commits() {
        let mut ctx = TransactionContext::new(LoadResult::absent(eq()), None);
        ctx.commit(7);
        assert!(ctx.is_committed());
    }

    #[test]
    fn commit_clears_pending_removal() {
        let mut ctx = TransactionContext::new(present(1), None);
        ctx.remove_and_commit();
        assert!(ctx.is_removed());
        ctx.commit(2);
        assert!(!ctx.is_removed());
        assert!(ctx.is_committed());
    }

    #[test]
    fn remove_on_present_read_commits() {
        let mut ctx = TransactionContext::new(present(1), None);
        ctx.remove_and_commit();
        assert!(ctx.is_committed());
        assert!(ctx.is_removed());
        assert!(ctx.committed_value().is_none());
    }

    #[test]
    fn remove_on_absent_read_is_noop() {
        let mut ctx = TransactionContext::new(LoadResult::absent(eq()), None);
        ctx.remove_and_commit();
        assert!(!ctx.is_committed());
        assert!(ctx.is_removed());
    }

    #[test]
    fn commit_option_dispatches() {
        let mut ctx = TransactionContext::new(present(1), None);
        ctx.commit_option(Some(5));
        assert!(ctx.is_committed());
        assert!(!ctx.is_removed());

        let mut ctx = TransactionContext::new(present(1), None);
        ctx.commit_option(None);
        assert!(ctx.is_removed());
    }

    #[test]
    fn commit_option_uses_comparer_not_identity() {
        // Re-committing the value just read elides the write even though
        // the option instance differs from the read's.
        let mut ctx = TransactionContext::new(present(3), None);
        let reread = *ctx.read().value().unwrap();
        ctx.commit_option(Some(reread));
        assert!(!ctx.is_committed());
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctx = TransactionContext::new(present(1), None);
        ctx.commit(9);
        ctx.reset();
        assert!(!ctx.is_committed());
        assert!(!ctx.is_removed());
        assert!(ctx.committed_value().is_none());
    }
}
