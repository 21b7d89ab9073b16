//! Serialization seam between typed values and byte streams.
//!
//! The persister owns stream lifetime and positioning; codecs read from
//! and write to borrowed streams and must not assume anything about the
//! underlying file. Payloads are opaque to the core - a codec is the only
//! component that interprets them.

use crate::cancel::CancelToken;
use crate::error::{PersistError, PersistResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use std::marker::PhantomData;

/// Deserialize/serialize callbacks for a stored value type.
pub trait ValueCodec<T>: Send + Sync {
    /// Reads a value from the stream.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Deserialize`] for malformed payloads,
    /// [`PersistError::Cancelled`] when cancelled.
    fn read(&self, cancel: &CancelToken, reader: &mut dyn Read) -> PersistResult<T>;

    /// Writes a value to the stream.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Serialize`] when the value cannot be
    /// encoded, [`PersistError::Cancelled`] when cancelled.
    fn write(&self, cancel: &CancelToken, value: &T, writer: &mut dyn Write) -> PersistResult<()>;
}

/// JSON codec over serde.
///
/// # Example
///
/// ```rust,ignore
/// let persister = FileDataPersister::new(path, Arc::new(JsonCodec));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> ValueCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn read(&self, cancel: &CancelToken, reader: &mut dyn Read) -> PersistResult<T> {
        cancel.checkpoint()?;
        serde_json::from_reader(reader).map_err(|err| PersistError::deserialize(err.to_string()))
    }

    fn write(&self, cancel: &CancelToken, value: &T, writer: &mut dyn Write) -> PersistResult<()> {
        cancel.checkpoint()?;
        serde_json::to_writer(writer, value).map_err(|err| PersistError::serialize(err.to_string()))
    }
}

/// Codec built from a pair of closures.
///
/// Useful for ad-hoc formats and for tests that need to inject failures.
pub struct FnCodec<T, R, W> {
    read_fn: R,
    write_fn: W,
    _marker: PhantomData<fn() -> T>,
}

/// Creates a codec from read and write closures.
pub fn from_fns<T, R, W>(read_fn: R, write_fn: W) -> FnCodec<T, R, W>
where
    R: Fn(&CancelToken, &mut dyn Read) -> PersistResult<T> + Send + Sync,
    W: Fn(&CancelToken, &T, &mut dyn Write) -> PersistResult<()> + Send + Sync,
{
    FnCodec {
        read_fn,
        write_fn,
        _marker: PhantomData,
    }
}

impl<T, R, W> ValueCodec<T> for FnCodec<T, R, W>
where
    T: Send + Sync,
    R: Fn(&CancelToken, &mut dyn Read) -> PersistResult<T> + Send + Sync,
    W: Fn(&CancelToken, &T, &mut dyn Write) -> PersistResult<()> + Send + Sync,
{
    fn read(&self, cancel: &CancelToken, reader: &mut dyn Read) -> PersistResult<T> {
        (self.read_fn)(cancel, reader)
    }

    fn write(&self, cancel: &CancelToken, value: &T, writer: &mut dyn Write) -> PersistResult<()> {
        (self.write_fn)(cancel, value, writer)
    }
}
