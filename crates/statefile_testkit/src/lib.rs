//! # statefile testkit
//!
//! Test utilities for statefile.
//!
//! This crate provides:
//! - Fixtures: tempdir-backed persisters and a sample versioned value type
//! - Crash harness: seed arbitrary on-disk states to exercise recovery
//! - Fault injection: a codec that fails on demand
//!
//! ## Usage
//!
//! ```rust,ignore
//! use statefile_testkit::prelude::*;
//!
//! #[test]
//! fn survives_interrupted_pivot() {
//!     let fixture = PersisterFixture::new();
//!     fixture.seed(CrashState::rolled_forward(b"42", b"43"));
//!     // ... load and assert recovery outcome
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod faults;
pub mod fixtures;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::faults::*;
    pub use crate::fixtures::*;
}

pub use crash::*;
pub use faults::*;
pub use fixtures::*;
