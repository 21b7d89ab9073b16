//! Fault-injecting codec.

use statefile_core::codec::ValueCodec;
use statefile_core::{CancelToken, PersistError, PersistResult};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A codec wrapper that fails reads or writes on demand.
///
/// Wraps any inner codec; failures are toggled at runtime through shared
/// flags, so a test can let the first update succeed and make the second
/// one fail mid-serialize.
///
/// # Example
///
/// ```rust,ignore
/// let codec = Arc::new(FaultCodec::new(Arc::new(JsonCodec)));
/// codec.fail_writes(true);
/// // next update fails during serialization, leaving P.new behind
/// ```
pub struct FaultCodec<T> {
    inner: Arc<dyn ValueCodec<T>>,
    fail_read: AtomicBool,
    fail_write: AtomicBool,
}

impl<T> FaultCodec<T> {
    /// Wraps an inner codec with both faults disabled.
    pub fn new(inner: Arc<dyn ValueCodec<T>>) -> Self {
        Self {
            inner,
            fail_read: AtomicBool::new(false),
            fail_write: AtomicBool::new(false),
        }
    }

    /// Toggles read failures.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }

    /// Toggles write failures.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }
}

impl<T> ValueCodec<T> for FaultCodec<T>
where
    T: Send + Sync,
{
    fn read(&self, cancel: &CancelToken, reader: &mut dyn Read) -> PersistResult<T> {
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(PersistError::deserialize("injected read fault"));
        }
        self.inner.read(cancel, reader)
    }

    fn write(&self, cancel: &CancelToken, value: &T, writer: &mut dyn Write) -> PersistResult<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            // Leave a partial payload behind, like a writer dying mid-stream.
            let _ = writer.write_all(b"{\"partial");
            return Err(PersistError::serialize("injected write fault"));
        }
        self.inner.write(cancel, value, writer)
    }
}
