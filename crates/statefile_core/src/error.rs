//! Error types for statefile operations.

use std::io;
use thiserror::Error;

/// Result type for persister operations.
///
/// By convention, entry points only return `Err` for conditions that must
/// propagate to the caller (cancellation). Expected failures - a missing
/// file, a deserialization problem, an unavailable lock - are captured
/// inside [`crate::LoadResult`] / [`crate::UpdateResult`] instead.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors that can occur during persister operations.
#[derive(Debug, Error)]
pub enum PersistError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stored payload could not be deserialized.
    #[error("deserialization failed: {message}")]
    Deserialize {
        /// Description of the failure.
        message: String,
    },

    /// The value could not be serialized.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the failure.
        message: String,
    },

    /// The lock file could not be acquired within the configured retries.
    #[error("lock unavailable: {path} after {attempts} attempts")]
    LockUnavailable {
        /// Path of the lock file.
        path: String,
        /// Number of acquisition attempts made.
        attempts: u32,
    },

    /// The operation was cancelled.
    ///
    /// Unlike every other variant, cancellation is never captured into a
    /// result record; it always propagates to the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The update callback reported a failure.
    #[error("update callback failed: {message}")]
    Callback {
        /// Description of the failure.
        message: String,
    },
}

impl PersistError {
    /// Creates a deserialization error.
    pub fn deserialize(message: impl Into<String>) -> Self {
        Self::Deserialize {
            message: message.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    /// Creates a lock-unavailable error.
    pub fn lock_unavailable(path: impl Into<String>, attempts: u32) -> Self {
        Self::LockUnavailable {
            path: path.into(),
            attempts,
        }
    }

    /// Creates a callback error.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Returns true if this error is [`PersistError::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_detected() {
        assert!(PersistError::Cancelled.is_cancelled());
        assert!(!PersistError::deserialize("bad payload").is_cancelled());
    }

    #[test]
    fn display_includes_context() {
        let err = PersistError::lock_unavailable("/tmp/value.lck", 3);
        let text = err.to_string();
        assert!(text.contains("/tmp/value.lck"));
        assert!(text.contains('3'));
    }

    #[test]
    fn io_error_converts() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: PersistError = io.into();
        assert!(matches!(err, PersistError::Io(_)));
    }
}
