//! Decorators that reshape what callers observe at the storage boundary.

mod default_value;
mod versionable;

pub use default_value::{DefaultValueDataPersister, DefaultValueOptions};
pub use versionable::{VersionableDataPersister, Versioned};
