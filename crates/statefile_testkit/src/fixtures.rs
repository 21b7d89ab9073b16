//! Test fixtures and persister helpers.

use serde::{Deserialize, Serialize};
use statefile_core::{FileDataPersister, FileSet, JsonCodec, PersisterSettings, Versioned};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A sample versioned value for exercising persisters end to end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestValue {
    /// Version of the serialized shape.
    pub format_version: u64,
    /// Arbitrary payload.
    pub payload: String,
}

impl TestValue {
    /// Creates a value with the given version and payload.
    pub fn new(format_version: u64, payload: impl Into<String>) -> Self {
        Self {
            format_version,
            payload: payload.into(),
        }
    }
}

impl Versioned for TestValue {
    fn format_version(&self) -> u64 {
        self.format_version
    }
}

/// A file persister on a temporary directory, cleaned up on drop.
pub struct PersisterFixture {
    base: PathBuf,
    /// Kept alive so the directory outlives the fixture.
    _temp_dir: TempDir,
}

impl PersisterFixture {
    /// Creates a fixture with a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let base = temp_dir.path().join("value.json");
        Self {
            base,
            _temp_dir: temp_dir,
        }
    }

    /// The base path of the managed file set.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The managed file set for direct inspection.
    #[must_use]
    pub fn files(&self) -> FileSet {
        FileSet::new(&self.base)
    }

    /// A JSON persister over the fixture's base path.
    #[must_use]
    pub fn persister(&self) -> FileDataPersister<TestValue> {
        FileDataPersister::new(&self.base, Arc::new(JsonCodec))
    }

    /// A JSON persister with custom settings.
    #[must_use]
    pub fn persister_with(&self, settings: PersisterSettings) -> FileDataPersister<TestValue> {
        self.persister().with_settings(settings)
    }
}

impl Default for PersisterFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a [`TestValue`] exactly as the JSON persister would store it.
///
/// # Panics
///
/// Panics if serialization fails, which cannot happen for [`TestValue`].
#[must_use]
pub fn encode_value(value: &TestValue) -> Vec<u8> {
    serde_json::to_vec(value).expect("TestValue serialization cannot fail")
}
