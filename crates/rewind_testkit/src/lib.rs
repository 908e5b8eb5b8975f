//! # Rewind Testkit
//!
//! Test utilities for Rewind.
//!
//! This crate provides:
//! - Environment fixtures on temporary directories and in memory
//! - An engine wrapper that injects flush failures
//! - Property-based operation generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use rewind_testkit::prelude::*;
//!
//! let mut fixture = MemoryEnvironment::deferred();
//! let root = fixture.env.open_catalog(None).unwrap();
//!
//! let mut txn = fixture.env.begin_write().unwrap();
//! txn.put(&root, b"k", b"v").unwrap();
//! txn.commit().unwrap();
//!
//! fixture.crash_and_recover();
//! assert_eq!(fixture.env.last_durable_sequence().unwrap().as_u64(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faulty;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
