//! Persister configuration.

use std::time::Duration;

/// Configuration for a file-backed persister.
#[derive(Debug, Clone)]
pub struct PersisterSettings {
    /// Maximum attempts to acquire the lock file.
    pub num_retries: u32,

    /// Base linear back-off between lock attempts; attempt `n` waits
    /// `n * retry_delay` before the next try.
    pub retry_delay: Duration,

    /// When on, the committed file is held open between operations and the
    /// deserialized value is cached in memory.
    pub exclusive_mode: bool,
}

impl Default for PersisterSettings {
    fn default() -> Self {
        Self {
            num_retries: 3,
            retry_delay: Duration::from_millis(100),
            exclusive_mode: true,
        }
    }
}

impl PersisterSettings {
    /// Creates settings with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of lock acquisition attempts.
    #[must_use]
    pub const fn num_retries(mut self, value: u32) -> Self {
        self.num_retries = value;
        self
    }

    /// Sets the base back-off between lock attempts.
    #[must_use]
    pub const fn retry_delay(mut self, value: Duration) -> Self {
        self.retry_delay = value;
        self
    }

    /// Sets whether the committed file is held open between operations.
    #[must_use]
    pub const fn exclusive_mode(mut self, value: bool) -> Self {
        self.exclusive_mode = value;
        self
    }
}
