//! The sequence-tracked environment handle.

use crate::catalog::{Catalog, CatalogRegistry};
use crate::config::{Config, Durability};
use crate::cursor::CursorSlot;
use crate::dir::EnvironmentDir;
use crate::error::{RewindError, RewindResult};
use crate::meta::{self, FORMAT_VERSION, META_CATALOG, RESERVED_PREFIX};
use crate::sequence::SequenceTracker;
use crate::transaction::Transaction;
use crate::types::{SequenceNumber, Sequences, TransactionMode};
use parking_lot::Mutex;
use rewind_engine::{EngineWrite, KvEngine, LmdbEngine, OpenFlags};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default file mode for newly created environment files.
pub const DEFAULT_MODE: u32 = 0o644;

/// Catalog handles and the cursor slot, shared with nested transactions.
#[derive(Debug)]
pub(crate) struct Handles {
    pub(crate) catalogs: CatalogRegistry,
    pub(crate) cursor: CursorSlot,
}

/// State of an open environment.
pub(crate) struct EnvInner<E: KvEngine> {
    pub(crate) engine: E,
    pub(crate) meta: Option<E::Catalog>,
    pub(crate) read_only: bool,
    pub(crate) durability: Durability,
    pub(crate) sequences: SequenceTracker,
    pub(crate) writer: Mutex<()>,
    pub(crate) handles: Handles,
    /// Released after the engine.
    _dir: Option<EnvironmentDir>,
}

impl<E: KvEngine> EnvInner<E> {
    /// Reads or initializes the metadata catalog and recovers the sequence.
    fn bootstrap(
        engine: E,
        dir: Option<EnvironmentDir>,
        read_only: bool,
        durability: Durability,
    ) -> RewindResult<Self> {
        let meta = match engine.open_catalog(Some(META_CATALOG), !read_only) {
            Ok(meta) => Some(meta),
            // Never opened for writing.
            Err(e) if read_only && e.is_not_found() => None,
            Err(e) => return Err(RewindError::from_open(engine.path(), e)),
        };

        let recovered = match meta {
            Some(meta) => Self::recover(&engine, meta, read_only)?,
            None => SequenceNumber::ZERO,
        };

        info!(
            path = %engine.path().display(),
            sequence = recovered.as_u64(),
            read_only,
            "environment opened"
        );

        Ok(Self {
            engine,
            meta,
            read_only,
            durability,
            sequences: SequenceTracker::new(recovered),
            writer: Mutex::new(()),
            handles: Handles {
                catalogs: CatalogRegistry::new(),
                cursor: CursorSlot::new(),
            },
            _dir: dir,
        })
    }

    fn recover(engine: &E, meta: E::Catalog, read_only: bool) -> RewindResult<SequenceNumber> {
        let (version, recovered) = {
            let txn = engine.begin_read()?;
            let version = meta::read_format_version(&txn, meta)?;
            meta::check_format_version(version)?;
            (version, meta::read_sequence(&txn, meta)?)
        };

        if version.is_none() && !read_only {
            debug!(version = FORMAT_VERSION, "initializing environment metadata");
            let mut txn = engine.begin_write()?;
            meta::write_format_version(&mut txn, meta, FORMAT_VERSION)?;
            txn.commit()?;
            engine.flush().map_err(RewindError::from_flush)?;
        }

        Ok(recovered)
    }

    /// Flushes any gap and releases catalog handles. The engine and the
    /// directory lock are released when `self` drops.
    fn shutdown(&self) -> RewindResult<()> {
        let released = self.handles.catalogs.release_all();

        let seqs = self.sequences.snapshot();
        if !self.read_only && seqs.gap() > 0 {
            if let Err(err) = self.engine.flush() {
                warn!(%seqs, error = %err, "flush on close failed");
                return Err(RewindError::from_flush(err));
            }
            self.sequences.mark_durable(seqs.current);
        }

        info!(
            path = %self.engine.path().display(),
            sequence = seqs.current.as_u64(),
            catalogs = released,
            "environment closed"
        );
        Ok(())
    }
}

enum EnvState<E: KvEngine> {
    Created,
    Open(Box<EnvInner<E>>),
    Closed,
}

/// A sequence-tracked environment.
///
/// The handle moves through `create -> open -> close`. While open it tracks
/// two counters:
///
/// - `current_sequence`: sequence of the last committed write transaction
/// - `last_durable_sequence`: highest sequence confirmed flushed to stable
///   storage
///
/// `current_sequence >= last_durable_sequence` always holds. After an unclean
/// restart, records a caller stamped with a sequence above the recovered
/// durable sequence may be missing and are the caller's to rewind.
///
/// # Example
///
/// ```rust
/// use rewind_core::{Config, Environment, TransactionMode};
/// use rewind_engine::InMemoryEngine;
///
/// let env = Environment::with_engine(InMemoryEngine::new(), Config::default()).unwrap();
/// let root = env.open_catalog(None).unwrap();
///
/// let mut txn = env.begin_transaction(TransactionMode::ReadWrite).unwrap();
/// txn.put(&root, b"k1", b"v1").unwrap();
/// txn.commit().unwrap();
///
/// assert_eq!(env.last_durable_sequence().unwrap().as_u64(), 1);
/// ```
pub struct Environment<E: KvEngine = LmdbEngine> {
    config: Config,
    state: EnvState<E>,
}

impl<E: KvEngine> Environment<E> {
    /// Creates an unopened handle with default configuration.
    #[must_use]
    pub fn create() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an unopened handle.
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            state: EnvState::Created,
        }
    }

    /// Creates a handle and opens it read-write at `path`.
    ///
    /// # Errors
    ///
    /// See [`Environment::open`].
    pub fn open_path(path: impl AsRef<Path>, config: Config) -> RewindResult<Self> {
        let mut env = Self::with_config(config);
        env.open(path, OpenFlags::empty(), DEFAULT_MODE)?;
        Ok(env)
    }

    /// Opens an environment over an already constructed engine.
    ///
    /// No directory lock is taken. Used with engines that do not live on
    /// disk, such as [`rewind_engine::InMemoryEngine`].
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read or initialized.
    pub fn with_engine(engine: E, config: Config) -> RewindResult<Self> {
        let inner = EnvInner::bootstrap(engine, None, false, config.durability)?;
        Ok(Self {
            config,
            state: EnvState::Open(Box::new(inner)),
        })
    }

    /// Binds the handle to `path` with `flags` and unix file `mode`.
    ///
    /// Both counters start at the sequence recovered from the store's
    /// metadata, or 0 for a new store.
    ///
    /// # Errors
    ///
    /// - [`RewindError::InvalidOperation`] if the handle is already open
    /// - [`RewindError::Open`] if the path is inaccessible, corrupt or locked
    /// - [`RewindError::VersionMismatch`] if the store format is incompatible
    /// - [`RewindError::Allocation`] if the engine cannot allocate
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        flags: OpenFlags,
        mode: u32,
    ) -> RewindResult<()> {
        if self.is_open() {
            return Err(RewindError::invalid_operation("environment is already open"));
        }

        let path = path.as_ref();
        let dir = EnvironmentDir::open(path, flags, self.config.create_if_missing)?;
        let options = self.config.engine_options(flags, mode);
        let engine = E::open(path, &options).map_err(|e| RewindError::from_open(path, e))?;
        let inner =
            EnvInner::bootstrap(engine, Some(dir), flags.read_only, self.config.durability)?;

        self.state = EnvState::Open(Box::new(inner));
        Ok(())
    }

    /// Returns true if the handle is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, EnvState::Open(_))
    }

    /// Returns true if the environment was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        match &self.state {
            EnvState::Open(inner) => inner.read_only,
            _ => false,
        }
    }

    /// Returns the path the environment is bound to, if open.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            EnvState::Open(inner) => Some(inner.engine.path()),
            _ => None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the underlying engine.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotOpen`] if the handle is not open.
    pub fn engine(&self) -> RewindResult<&E> {
        Ok(&self.inner()?.engine)
    }

    /// Returns a consistent snapshot of both counters.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotOpen`] if the handle is not open.
    pub fn sequences(&self) -> RewindResult<Sequences> {
        Ok(self.inner()?.sequences.snapshot())
    }

    /// Highest sequence confirmed flushed to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotOpen`] if the handle is not open.
    pub fn last_durable_sequence(&self) -> RewindResult<SequenceNumber> {
        Ok(self.sequences()?.durable)
    }

    /// Sequence of the last committed write transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::NotOpen`] if the handle is not open.
    pub fn current_sequence(&self) -> RewindResult<SequenceNumber> {
        Ok(self.sequences()?.current)
    }

    /// Opens a catalog, creating it unless the environment is read-only.
    ///
    /// `None` opens the engine's unnamed root catalog. Catalogs should be
    /// opened before transactions are started on the same thread.
    ///
    /// # Errors
    ///
    /// - [`RewindError::InvalidOperation`] for names starting with `__rewind`
    /// - [`RewindError::CatalogNotFound`] if it is missing in a read-only environment
    pub fn open_catalog(&self, name: Option<&str>) -> RewindResult<Catalog<E::Catalog>> {
        let inner = self.inner()?;
        if let Some(name) = name {
            if name.starts_with(RESERVED_PREFIX) {
                return Err(RewindError::invalid_operation(format!(
                    "catalog name {name:?} is reserved"
                )));
            }
        }

        let handle = inner
            .engine
            .open_catalog(name, !inner.read_only)
            .map_err(|e| {
                if e.is_not_found() {
                    RewindError::CatalogNotFound {
                        name: name.unwrap_or("<root>").to_string(),
                    }
                } else {
                    e.into()
                }
            })?;
        Ok(inner.handles.catalogs.register(name, handle))
    }

    /// Releases a catalog handle. Releasing twice is a no-op.
    pub fn close_catalog(&self, catalog: &Catalog<E::Catalog>) {
        if let EnvState::Open(inner) = &self.state {
            if inner.handles.catalogs.release(catalog) {
                debug!(catalog = catalog.name().unwrap_or("<root>"), "catalog closed");
            }
        }
    }

    /// Begins a transaction.
    ///
    /// A read-write transaction blocks until the previous writer finishes.
    ///
    /// # Errors
    ///
    /// - [`RewindError::ReadOnlyViolation`] for a write on a read-only environment
    /// - [`RewindError::TransactionLimit`] when the reader table is full
    pub fn begin_transaction(&self, mode: TransactionMode) -> RewindResult<Transaction<'_, E>> {
        let inner = self.inner()?;
        match mode {
            TransactionMode::ReadOnly => Transaction::read(inner),
            TransactionMode::ReadWrite => Transaction::write(inner),
        }
    }

    /// Begins a read-only transaction.
    ///
    /// # Errors
    ///
    /// See [`Environment::begin_transaction`].
    pub fn begin_read(&self) -> RewindResult<Transaction<'_, E>> {
        self.begin_transaction(TransactionMode::ReadOnly)
    }

    /// Begins a read-write transaction.
    ///
    /// # Errors
    ///
    /// See [`Environment::begin_transaction`].
    pub fn begin_write(&self) -> RewindResult<Transaction<'_, E>> {
        self.begin_transaction(TransactionMode::ReadWrite)
    }

    /// Flushes the engine and advances the durable sequence to the current one.
    ///
    /// Commits that land while the flush runs stay in the gap.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::Io`] if the flush fails; the durable sequence
    /// is then unchanged.
    pub fn sync(&self) -> RewindResult<Sequences> {
        let inner = self.inner()?;
        if inner.read_only {
            return Ok(inner.sequences.snapshot());
        }

        let target = inner.sequences.snapshot().current;
        if let Err(err) = inner.engine.flush() {
            warn!(sequence = target.as_u64(), error = %err, "sync failed");
            return Err(RewindError::from_flush(err));
        }
        let seqs = inner.sequences.mark_durable(target);
        debug!(%seqs, "synced");
        Ok(seqs)
    }

    /// Runs a recovery routine inside one write transaction.
    ///
    /// `routine` receives the transaction and the current durable sequence.
    /// It decides which records stamped above that sequence to discard. The transaction commits if the routine succeeds and aborts
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns the routine's error, or an error from beginning or committing
    /// the transaction.
    pub fn rewind_with<'env, F, T>(&'env self, routine: F) -> RewindResult<T>
    where
        F: FnOnce(&mut Transaction<'env, E>, SequenceNumber) -> RewindResult<T>,
    {
        let inner = self.inner()?;
        let durable = inner.sequences.snapshot().durable;
        let mut txn = Transaction::write(inner)?;
        let output = routine(&mut txn, durable)?;
        let writes = txn.write_count();
        let seq = txn.commit()?;
        info!(
            durable = durable.as_u64(),
            sequence = seq.as_u64(),
            writes,
            "rewind routine committed"
        );
        Ok(output)
    }

    /// Closes the environment.
    ///
    /// Catalog handles are released, any durable gap is flushed, then the
    /// engine and the directory lock are released. Closing again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RewindError::Io`] if the final flush fails. The handle is
    /// closed regardless.
    pub fn close(&mut self) -> RewindResult<()> {
        match std::mem::replace(&mut self.state, EnvState::Closed) {
            EnvState::Open(inner) => inner.shutdown(),
            EnvState::Created | EnvState::Closed => Ok(()),
        }
    }

    fn inner(&self) -> RewindResult<&EnvInner<E>> {
        match &self.state {
            EnvState::Open(inner) => Ok(&**inner),
            EnvState::Created | EnvState::Closed => Err(RewindError::NotOpen),
        }
    }
}

impl<E: KvEngine> Drop for Environment<E> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing environment on drop");
        }
    }
}

impl<E: KvEngine> fmt::Debug for Environment<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Environment");
        match &self.state {
            EnvState::Created => s.field("state", &"created"),
            EnvState::Closed => s.field("state", &"closed"),
            EnvState::Open(inner) => s
                .field("state", &"open")
                .field("path", &inner.engine.path())
                .field("sequences", &inner.sequences.snapshot()),
        };
        s.field("config", &self.config).finish()
    }
}
