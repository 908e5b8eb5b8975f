//! Transactions over a sequence-tracked environment.
//!
//! A [`Transaction`] borrows its environment and wraps one engine
//! transaction. Read-write transactions count their logical writes; a commit
//! with at least one write is assigned the next sequence number.
//!
//! Dropping a transaction without committing aborts it.

use crate::catalog::Catalog;
use crate::config::Durability;
use crate::cursor::Cursor;
use crate::environment::{EnvInner, Handles};
use crate::error::{RewindError, RewindResult};
use crate::meta;
use crate::types::{SequenceNumber, TransactionMode};
use parking_lot::MutexGuard;
use rewind_engine::{EngineRead, EngineWrite, KvEngine, PutFlags};
use std::fmt;
use tracing::{debug, warn};

enum TxnKind<'env, E: KvEngine + 'env> {
    Read(E::ReadTxn<'env>),
    Write {
        txn: E::WriteTxn<'env>,
        /// Held until the commit has updated the counters.
        _writer: MutexGuard<'env, ()>,
    },
}

/// A transaction on an [`crate::Environment`].
pub struct Transaction<'env, E: KvEngine + 'env> {
    env: &'env EnvInner<E>,
    kind: TxnKind<'env, E>,
    writes: u64,
}

impl<'env, E: KvEngine + 'env> Transaction<'env, E> {
    pub(crate) fn read(env: &'env EnvInner<E>) -> RewindResult<Self> {
        let txn = env.engine.begin_read()?;
        Ok(Self {
            env,
            kind: TxnKind::Read(txn),
            writes: 0,
        })
    }

    pub(crate) fn write(env: &'env EnvInner<E>) -> RewindResult<Self> {
        if env.read_only {
            return Err(RewindError::ReadOnlyViolation);
        }
        let writer = env.writer.lock();
        let txn = env.engine.begin_write()?;
        Ok(Self {
            env,
            kind: TxnKind::Write {
                txn,
                _writer: writer,
            },
            writes: 0,
        })
    }

    /// Returns the access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        match self.kind {
            TxnKind::Read(_) => TransactionMode::ReadOnly,
            TxnKind::Write { .. } => TransactionMode::ReadWrite,
        }
    }

    /// Number of logical writes so far, including committed nested ones.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// The sequence this transaction receives if it commits with writes.
    ///
    /// Returns `None` for read-only transactions. Callers stamp their own
    /// records with this value to compare against the durable sequence
    /// after a restart.
    #[must_use]
    pub fn pending_sequence(&self) -> Option<SequenceNumber> {
        match self.kind {
            TxnKind::Read(_) => None,
            TxnKind::Write { .. } => Some(self.env.sequences.pending()),
        }
    }

    /// Reads `key` from the transaction's snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotFound`] if the key is absent.
    pub fn get(&self, catalog: &Catalog<E::Catalog>, key: &[u8]) -> RewindResult<&[u8]> {
        self.get_optional(catalog, key)?.ok_or(RewindError::NotFound)
    }

    /// Reads `key`, returning `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog was closed or the engine read fails.
    pub fn get_optional(
        &self,
        catalog: &Catalog<E::Catalog>,
        key: &[u8],
    ) -> RewindResult<Option<&[u8]>> {
        self.env.handles.catalogs.ensure_open(catalog)?;
        let value = match &self.kind {
            TxnKind::Read(txn) => txn.get(catalog.handle(), key)?,
            TxnKind::Write { txn, .. } => txn.get(catalog.handle(), key)?,
        };
        Ok(value)
    }

    /// Inserts or overwrites `key -> value`.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::ReadOnlyViolation`] on a read-only transaction
    /// and [`RewindError::Capacity`] if the store is full.
    pub fn put(
        &mut self,
        catalog: &Catalog<E::Catalog>,
        key: &[u8],
        value: &[u8],
    ) -> RewindResult<()> {
        self.put_with_flags(catalog, key, value, PutFlags::empty())
    }

    /// Like [`Transaction::put`] with explicit engine flags.
    ///
    /// # Errors
    ///
    /// Additionally returns [`RewindError::KeyExists`] when the flags forbid
    /// overwriting.
    pub fn put_with_flags(
        &mut self,
        catalog: &Catalog<E::Catalog>,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> RewindResult<()> {
        self.env.handles.catalogs.ensure_open(catalog)?;
        self.write_txn()?.put(catalog.handle(), key, value, flags)?;
        self.writes += 1;
        Ok(())
    }

    /// Deletes `key`, returning whether it existed.
    ///
    /// Only a delete that removed something counts as a write.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::ReadOnlyViolation`] on a read-only transaction.
    pub fn delete(&mut self, catalog: &Catalog<E::Catalog>, key: &[u8]) -> RewindResult<bool> {
        self.env.handles.catalogs.ensure_open(catalog)?;
        let existed = self.write_txn()?.delete(catalog.handle(), key)?;
        if existed {
            self.writes += 1;
        }
        Ok(existed)
    }

    /// Opens the environment's cursor over `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::CursorInUse`] if another cursor is open.
    pub fn open_cursor(&self, catalog: &Catalog<E::Catalog>) -> RewindResult<Cursor<'_>> {
        self.env.handles.catalogs.ensure_open(catalog)?;
        let slot = self.env.handles.cursor.acquire()?;
        let inner = match &self.kind {
            TxnKind::Read(txn) => txn.open_cursor(catalog.handle())?,
            TxnKind::Write { txn, .. } => txn.open_cursor(catalog.handle())?,
        };
        Ok(Cursor::new(inner, slot))
    }

    /// Begins a nested transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::ReadOnlyViolation`] on a read-only transaction.
    pub fn begin_nested(&mut self) -> RewindResult<NestedTransaction<'_, E::WriteTxn<'env>>> {
        let env = self.env;
        let TxnKind::Write { txn, .. } = &mut self.kind else {
            return Err(RewindError::ReadOnlyViolation);
        };
        let child = txn.begin_nested()?;
        Ok(NestedTransaction {
            txn: child,
            handles: &env.handles,
            parent_writes: &mut self.writes,
            writes: 0,
        })
    }

    /// Commits the transaction and returns its sequence.
    ///
    /// A write transaction with at least one write receives
    /// `current_sequence + 1`. Read-only transactions and write transactions
    /// without writes return the unchanged current sequence.
    ///
    /// With [`Durability::Immediate`] the engine is flushed before the
    /// counters move; a failed flush returns [`RewindError::Io`] and leaves
    /// both counters unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine commit or the flush fails. Counters are
    /// unchanged in either case.
    pub fn commit(self) -> RewindResult<SequenceNumber> {
        let Self { env, kind, writes } = self;
        let (mut txn, _writer) = match kind {
            TxnKind::Read(txn) => {
                drop(txn);
                return Ok(env.sequences.snapshot().current);
            }
            TxnKind::Write { txn, _writer: writer } => (txn, writer),
        };

        if writes == 0 {
            txn.abort();
            return Ok(env.sequences.snapshot().current);
        }

        let meta = env
            .meta
            .ok_or_else(|| RewindError::invalid_operation("environment has no metadata catalog"))?;
        let next = env.sequences.pending();
        meta::write_sequence(&mut txn, meta, next)?;
        txn.commit()?;

        match env.durability {
            Durability::Immediate => {
                if let Err(err) = env.engine.flush() {
                    warn!(sequence = next.as_u64(), error = %err, "flush after commit failed");
                    return Err(RewindError::from_flush(err));
                }
                env.sequences.confirm(next);
            }
            Durability::Deferred => env.sequences.issue(next),
        }

        debug!(sequence = next.as_u64(), writes, "committed write transaction");
        Ok(next)
    }

    /// Discards the transaction. Counters are unchanged.
    pub fn abort(self) {
        match self.kind {
            TxnKind::Read(txn) => drop(txn),
            TxnKind::Write { txn, .. } => {
                txn.abort();
                debug!(writes = self.writes, "aborted write transaction");
            }
        }
    }

    fn write_txn(&mut self) -> RewindResult<&mut E::WriteTxn<'env>> {
        match &mut self.kind {
            TxnKind::Write { txn, .. } => Ok(txn),
            TxnKind::Read(_) => Err(RewindError::ReadOnlyViolation),
        }
    }
}

impl<'env, E: KvEngine + 'env> fmt::Debug for Transaction<'env, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode())
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

/// A transaction nested under a read-write parent.
///
/// Committing folds the child's writes and write count into the parent.
/// Aborting or dropping it discards them and leaves the parent untouched.
pub struct NestedTransaction<'p, W: EngineWrite + 'p> {
    txn: W::Nested<'p>,
    handles: &'p Handles,
    parent_writes: &'p mut u64,
    writes: u64,
}

impl<'p, W: EngineWrite + 'p> NestedTransaction<'p, W> {
    /// Number of logical writes so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    /// Reads `key`, seeing the parent's uncommitted writes.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotFound`] if the key is absent.
    pub fn get(&self, catalog: &Catalog<W::Catalog>, key: &[u8]) -> RewindResult<&[u8]> {
        self.get_optional(catalog, key)?.ok_or(RewindError::NotFound)
    }

    /// Reads `key`, returning `None` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog was closed or the engine read fails.
    pub fn get_optional(
        &self,
        catalog: &Catalog<W::Catalog>,
        key: &[u8],
    ) -> RewindResult<Option<&[u8]>> {
        self.handles.catalogs.ensure_open(catalog)?;
        Ok(self.txn.get(catalog.handle(), key)?)
    }

    /// Inserts or overwrites `key -> value`.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::Capacity`] if the store is full.
    pub fn put(
        &mut self,
        catalog: &Catalog<W::Catalog>,
        key: &[u8],
        value: &[u8],
    ) -> RewindResult<()> {
        self.put_with_flags(catalog, key, value, PutFlags::empty())
    }

    /// Like [`NestedTransaction::put`] with explicit engine flags.
    ///
    /// # Errors
    ///
    /// Additionally returns [`RewindError::KeyExists`] when the flags forbid
    /// overwriting.
    pub fn put_with_flags(
        &mut self,
        catalog: &Catalog<W::Catalog>,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> RewindResult<()> {
        self.handles.catalogs.ensure_open(catalog)?;
        self.txn.put(catalog.handle(), key, value, flags)?;
        self.writes += 1;
        Ok(())
    }

    /// Deletes `key`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog was closed or the engine fails.
    pub fn delete(&mut self, catalog: &Catalog<W::Catalog>, key: &[u8]) -> RewindResult<bool> {
        self.handles.catalogs.ensure_open(catalog)?;
        let existed = self.txn.delete(catalog.handle(), key)?;
        if existed {
            self.writes += 1;
        }
        Ok(existed)
    }

    /// Opens the environment's cursor over `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::CursorInUse`] if another cursor is open.
    pub fn open_cursor(&self, catalog: &Catalog<W::Catalog>) -> RewindResult<Cursor<'_>> {
        self.handles.catalogs.ensure_open(catalog)?;
        let slot = self.handles.cursor.acquire()?;
        let inner = self.txn.open_cursor(catalog.handle())?;
        Ok(Cursor::new(inner, slot))
    }

    /// Begins a transaction nested under this one.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start the child.
    pub fn begin_nested(&mut self) -> RewindResult<NestedTransaction<'_, W::Nested<'p>>> {
        let child = self.txn.begin_nested()?;
        Ok(NestedTransaction {
            txn: child,
            handles: self.handles,
            parent_writes: &mut self.writes,
            writes: 0,
        })
    }

    /// Commits into the parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the commit; the child's writes
    /// are then discarded.
    pub fn commit(self) -> RewindResult<()> {
        let Self {
            txn,
            parent_writes,
            writes,
            ..
        } = self;
        txn.commit()?;
        *parent_writes += writes;
        Ok(())
    }

    /// Discards the child's writes.
    pub fn abort(self) {
        self.txn.abort();
    }
}

impl<'p, W: EngineWrite + 'p> fmt::Debug for NestedTransaction<'p, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedTransaction")
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}
