//! Read-only loader for a single file.

use crate::cancel::CancelToken;
use crate::codec::ValueCodec;
use crate::error::{PersistError, PersistResult};
use crate::persister::DataReader;
use crate::result::{Equality, LoadResult};
use parking_lot::Mutex;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared-read loader from a single file.
///
/// Unlike [`crate::FileDataPersister`] this reader takes no lock file and
/// performs no recovery: it is meant for plain files that are not managed
/// by a persister, typically the immutable reference data consumed by the
/// versionable decorator. Reads take a shared advisory lock for the
/// duration of the deserialize call.
///
/// When the file is declared constant via [`with_constant_data`], the
/// first non-error load is memoized and returned for every later load.
///
/// [`with_constant_data`]: FileDataReader::with_constant_data
pub struct FileDataReader<T> {
    path: PathBuf,
    codec: Arc<dyn ValueCodec<T>>,
    equality: Equality<T>,
    constant: bool,
    memo: Mutex<Option<LoadResult<T>>>,
}

impl<T> FileDataReader<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a reader with structural equality.
    pub fn new(path: impl Into<PathBuf>, codec: Arc<dyn ValueCodec<T>>) -> Self
    where
        T: PartialEq,
    {
        Self {
            path: path.into(),
            codec,
            equality: Equality::structural(),
            constant: false,
            memo: Mutex::new(None),
        }
    }

    /// Replaces the equality comparer.
    #[must_use]
    pub fn with_equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    /// Declares the file's contents immutable, enabling the one-shot
    /// load cache.
    #[must_use]
    pub fn with_constant_data(mut self, constant: bool) -> Self {
        self.constant = constant;
        self
    }

    /// Returns the path this reader loads from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_once(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        cancel.checkpoint()?;

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(LoadResult::absent(self.equality.clone()));
            }
            Err(err) => {
                return Ok(LoadResult::error(err.into(), self.equality.clone()));
            }
        };

        if let Err(err) = fs2::FileExt::try_lock_shared(&file) {
            return Ok(LoadResult::error(err.into(), self.equality.clone()));
        }

        match self.codec.read(cancel, &mut file) {
            Ok(value) => Ok(LoadResult::present(value, self.equality.clone())),
            Err(PersistError::Cancelled) => Err(PersistError::Cancelled),
            Err(err) => Ok(LoadResult::error(err, self.equality.clone())),
        }
    }
}

impl<T> DataReader<T> for FileDataReader<T>
where
    T: Clone + Send + 'static,
{
    fn load(&self, cancel: &CancelToken) -> PersistResult<LoadResult<T>> {
        if self.constant {
            if let Some(memoized) = self.memo.lock().as_ref() {
                return Ok(memoized.clone());
            }
        }

        let result = self.read_once(cancel)?;

        if self.constant && !result.is_error() {
            *self.memo.lock() = Some(result.clone());
        }
        Ok(result)
    }

    fn is_data_constant(&self) -> bool {
        self.constant
    }

    fn equality(&self) -> Equality<T> {
        self.equality.clone()
    }
}
