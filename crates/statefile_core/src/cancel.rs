//! Cooperative cancellation for persister operations.
//!
//! Every entry point takes a [`CancelToken`]. The token is checked at the
//! start of each operation and between lock-retry attempts; the retry wait
//! itself is a condvar wait that wakes immediately on [`CancelToken::cancel`]
//! instead of sleeping out the full delay.

use crate::error::{PersistError, PersistResult};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A cooperative cancellation signal.
///
/// Cloning produces another handle to the same signal. Once cancelled, a
/// token stays cancelled.
///
/// # Example
///
/// ```rust
/// use statefile_core::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    flag: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl CancelToken {
    /// Creates a new token in the non-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                lock: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Requests cancellation. Wakes all pending waits immediately.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.condvar.notify_all();
    }

    /// Checks whether cancellation has been requested (non-blocking).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(PersistError::Cancelled)` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Cancelled`] when the token is cancelled.
    pub fn checkpoint(&self) -> PersistResult<()> {
        if self.is_cancelled() {
            return Err(PersistError::Cancelled);
        }
        Ok(())
    }

    /// Waits for at most `timeout`, waking immediately if [`cancel`] is
    /// called. Returns true if cancellation was requested.
    ///
    /// [`cancel`]: CancelToken::cancel
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let mut guard = self.inner.lock.lock();
        let _ = self.inner.condvar.wait_for(&mut guard, timeout);
        self.is_cancelled()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
