//! # Rewind Engine
//!
//! The storage-engine seam for Rewind.
//!
//! Rewind does not implement a storage engine. It layers sequence tracking on
//! top of an existing transactional key-value engine, and this crate defines
//! the contract it consumes from that engine:
//!
//! - [`KvEngine`] - an environment: open, catalogs, transactions, flush
//! - [`EngineRead`] - snapshot reads and cursors
//! - [`EngineWrite`] - writes, nested transactions, commit and abort
//! - [`EngineCursor`] - ordered iteration over one catalog
//!
//! ## Available Engines
//!
//! - [`LmdbEngine`] - LMDB via the `lmdb` crate
//! - [`InMemoryEngine`] - For testing; models committed vs. flushed state
//!
//! ## Example
//!
//! ```rust
//! use rewind_engine::{EngineOptions, EngineRead, EngineWrite, InMemoryEngine, KvEngine, PutFlags};
//! use std::path::Path;
//!
//! let engine = InMemoryEngine::open(Path::new("mem"), &EngineOptions::default()).unwrap();
//! let table = engine.open_catalog(Some("table"), true).unwrap();
//!
//! let mut txn = engine.begin_write().unwrap();
//! txn.put(table, b"k1", b"v1", PutFlags::empty()).unwrap();
//! txn.commit().unwrap();
//!
//! let txn = engine.begin_read().unwrap();
//! assert_eq!(txn.get(table, b"k1").unwrap(), Some(&b"v1"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod mdb;
mod memory;
mod options;

pub use engine::{EngineCursor, EngineRead, EngineWrite, KeyValue, KvEngine};
pub use error::{EngineError, EngineResult};
pub use mdb::{LmdbCursor, LmdbEngine, LmdbReadTxn, LmdbWriteTxn};
pub use memory::{InMemoryEngine, MemCatalog, MemNestedTxn, MemReadTxn, MemWriteTxn};
pub use options::{EngineOptions, OpenFlags, PutFlags};
