//! Engine trait definitions.

use crate::error::EngineResult;
use crate::options::{EngineOptions, PutFlags};
use std::fmt;
use std::path::Path;

/// A key/value pair borrowed from a transaction.
pub type KeyValue<'txn> = (&'txn [u8], &'txn [u8]);

/// A transactional key-value engine environment.
///
/// Engines are **opaque stores**. They own page management, MVCC and crash
/// recovery; the sequence-tracking layer only forwards calls to them.
///
/// # Invariants
///
/// - At most one write transaction is live at a time
/// - A read transaction sees a consistent snapshot for its whole lifetime
/// - `commit` makes a write visible to later transactions
/// - `flush` returns only once every committed write is on stable storage
/// - Engines must be `Send + Sync` so environments can be shared across threads
///
/// # Implementors
///
/// - [`super::LmdbEngine`] - LMDB
/// - [`super::InMemoryEngine`] - For testing
pub trait KvEngine: Send + Sync + Sized {
    /// Handle to a named sub-database.
    type Catalog: Copy + fmt::Debug + Send + Sync + 'static;

    /// A read-only transaction.
    type ReadTxn<'env>: EngineRead<Catalog = Self::Catalog>
    where
        Self: 'env;

    /// A read-write transaction.
    type WriteTxn<'env>: EngineWrite<Catalog = Self::Catalog>
    where
        Self: 'env;

    /// Opens (or creates) the environment at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is inaccessible, the store is corrupt or
    /// was written by an incompatible version, or the engine cannot allocate
    /// its environment object.
    fn open(path: &Path, options: &EngineOptions) -> EngineResult<Self>;

    /// Returns the path the environment was opened at.
    fn path(&self) -> &Path;

    /// Opens a catalog, creating it when `create` is true.
    ///
    /// `None` names the engine's unnamed root catalog.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the catalog is missing and `create` is false.
    fn open_catalog(&self, name: Option<&str>, create: bool) -> EngineResult<Self::Catalog>;

    /// Begins a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns `TooManyTransactions` when the reader table is exhausted.
    fn begin_read(&self) -> EngineResult<Self::ReadTxn<'_>>;

    /// Begins a read-write transaction, blocking until the writer slot is free.
    ///
    /// # Errors
    ///
    /// Returns `ReadOnly` if the environment was opened read-only.
    fn begin_write(&self) -> EngineResult<Self::WriteTxn<'_>>;

    /// Flushes every committed transaction to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails; committed data may then be lost
    /// on an unclean shutdown.
    fn flush(&self) -> EngineResult<()>;
}

/// Read access shared by read-only and read-write transactions.
pub trait EngineRead {
    /// Catalog handle type of the owning engine.
    type Catalog: Copy;

    /// Looks up `key`, returning `None` when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog handle is invalid or the store is corrupt.
    fn get(&self, catalog: Self::Catalog, key: &[u8]) -> EngineResult<Option<&[u8]>>;

    /// Opens a cursor over `catalog`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate a cursor.
    fn open_cursor(&self, catalog: Self::Catalog) -> EngineResult<Box<dyn EngineCursor<'_> + '_>>;
}

/// Write access of a read-write (possibly nested) transaction.
pub trait EngineWrite: EngineRead + Sized {
    /// A child transaction nested under this one.
    type Nested<'p>: EngineWrite<Catalog = Self::Catalog>
    where
        Self: 'p;

    /// Inserts or overwrites `key -> value`.
    ///
    /// # Errors
    ///
    /// Returns `KeyExists` when `flags` forbid the write, `Full` when the
    /// store has no room left.
    fn put(
        &mut self,
        catalog: Self::Catalog,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> EngineResult<()>;

    /// Deletes `key`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to update the catalog.
    fn delete(&mut self, catalog: Self::Catalog, key: &[u8]) -> EngineResult<bool>;

    /// Begins a child transaction. Its writes reach this transaction only if
    /// the child commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start the child.
    fn begin_nested(&mut self) -> EngineResult<Self::Nested<'_>>;

    /// Commits the transaction.
    ///
    /// For a top-level transaction the writes become visible to later
    /// transactions. Durability additionally requires [`KvEngine::flush`]
    /// unless the engine syncs on commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; the writes are then discarded.
    fn commit(self) -> EngineResult<()>;

    /// Discards the transaction's writes.
    fn abort(self);
}

/// An ordered cursor over one catalog.
///
/// Entries are returned in ascending key order and borrow from the
/// transaction that opened the cursor.
pub trait EngineCursor<'txn> {
    /// Positions at the first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to position the cursor.
    fn first(&mut self) -> EngineResult<Option<KeyValue<'txn>>>;

    /// Positions at the first entry whose key is greater than or equal to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to position the cursor.
    fn seek(&mut self, key: &[u8]) -> EngineResult<Option<KeyValue<'txn>>>;

    /// Advances to the next entry. An unpositioned cursor starts at the first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to advance the cursor.
    fn next(&mut self) -> EngineResult<Option<KeyValue<'txn>>>;
}
