//! # statefile
//!
//! Transactional single-value file persistence.
//!
//! statefile provides crash-safe, concurrency-safe atomic updates of a
//! typed value stored in a single file, on filesystems with no native
//! transactional primitives:
//!
//! - [`FileDataPersister`] - the transactional core: load, atomic
//!   read-modify-write through a callback, lock-file protocol,
//!   deterministic crash recovery, exclusive-mode caching
//! - [`FileDataReader`] - read-only loader with a one-shot cache for
//!   immutable reference data
//! - [`MemoryDataPersister`] - the same contract in memory, for tests and
//!   ephemeral storage
//! - [`DefaultValueDataPersister`] - maps empty/default values at the
//!   caller boundary to presence/absence at the storage boundary
//! - [`VersionableDataPersister`] - prefers an immutable reference value
//!   when its format version differs from the local one
//!
//! ## On-disk protocol
//!
//! For a base path `P`, the persister manages `P` (committed), `P.new`
//! (staged), `P.old` (pivot leftover), and `P.lck` (lock sentinel).
//! Commits stage the next value in `P.new` and pivot with renames; a crash
//! at any point leaves a state that recovery resolves deterministically at
//! the next lock acquisition. See [`FileSet`].
//!
//! ## Example
//!
//! ```rust
//! use statefile_core::{CancelToken, DataPersisterExt, DataReader, MemoryDataPersister};
//!
//! let persister = MemoryDataPersister::new();
//! let cancel = CancelToken::new();
//!
//! let result = persister
//!     .update(&cancel, None, |ctx| {
//!         let next = ctx.read().value().copied().unwrap_or(0) + 1;
//!         ctx.commit(next);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert!(result.is_updated());
//! assert_eq!(persister.load(&cancel).unwrap().value(), Some(&1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
pub mod codec;
mod decorator;
mod error;
mod file_persister;
mod file_reader;
mod file_set;
mod lock;
mod memory;
mod persister;
mod result;
mod settings;
mod transaction;

pub use cancel::CancelToken;
pub use codec::{JsonCodec, ValueCodec};
pub use decorator::{
    DefaultValueDataPersister, DefaultValueOptions, VersionableDataPersister, Versioned,
};
pub use error::{PersistError, PersistResult};
pub use file_persister::FileDataPersister;
pub use file_reader::FileDataReader;
pub use file_set::{FileSet, FileSetState};
pub use lock::FileLock;
pub use memory::MemoryDataPersister;
pub use persister::{DataPersister, DataPersisterExt, DataReader, UpdateFn};
pub use result::{CorrelationTag, Equality, LoadResult, UpdateResult};
pub use settings::PersisterSettings;
pub use transaction::TransactionContext;
