//! # Rewind Core
//!
//! Sequence-tracked environments over an LMDB-style key-value engine.
//!
//! An [`Environment`] forwards transactions, reads, writes and cursors to a
//! [`KvEngine`] and keeps two counters next to them:
//!
//! - **current sequence**: assigned to every committed write transaction
//! - **durable sequence**: the highest sequence confirmed flushed to stable storage
//!
//! The current sequence is persisted inside each commit, so reopening an
//! environment recovers the sequence of the last commit that survived.
//! Applications stamp their own records with
//! [`Transaction::pending_sequence`]; after an unclean restart every record
//! stamped above the recovered durable sequence is a candidate for rewind,
//! which [`Environment::rewind_with`] runs as one write transaction.
//!
//! ## Durability
//!
//! With [`Durability::Immediate`] (the default) each write commit is flushed
//! before it is confirmed and the two counters move together. With
//! [`Durability::Deferred`] commits only advance the current sequence until
//! [`Environment::sync`] or close flushes them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod config;
mod cursor;
mod dir;
mod environment;
mod error;
mod meta;
mod sequence;
mod transaction;
mod types;

pub use catalog::Catalog;
pub use config::{Config, Durability};
pub use cursor::Cursor;
pub use environment::{Environment, DEFAULT_MODE};
pub use error::{RewindError, RewindResult};
pub use meta::FORMAT_VERSION;
pub use transaction::{NestedTransaction, Transaction};
pub use types::{SequenceNumber, Sequences, TransactionMode};

pub use rewind_engine::{InMemoryEngine, KvEngine, LmdbEngine, OpenFlags, PutFlags};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
