//! In-memory engine for testing.

use crate::engine::{EngineCursor, EngineRead, EngineWrite, KeyValue, KvEngine};
use crate::error::{EngineError, EngineResult};
use crate::options::{EngineOptions, PutFlags};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

/// Catalog handle of an [`InMemoryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemCatalog(u32);

/// All catalogs of one committed (or in-flight) state.
#[derive(Debug, Clone, Default)]
struct Tables {
    tables: BTreeMap<MemCatalog, Table>,
    bytes: usize,
}

impl Tables {
    fn get(&self, catalog: MemCatalog, key: &[u8]) -> Option<&[u8]> {
        self.tables
            .get(&catalog)
            .and_then(|table| table.get(key))
            .map(Vec::as_slice)
    }

    fn put(
        &mut self,
        catalog: MemCatalog,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
        capacity: usize,
    ) -> EngineResult<()> {
        let table = self.tables.entry(catalog).or_default();

        if flags.no_overwrite && table.contains_key(key) {
            return Err(EngineError::KeyExists);
        }
        if flags.append {
            if let Some((last, _)) = table.last_key_value() {
                if last.as_slice() >= key {
                    return Err(EngineError::KeyExists);
                }
            }
        }

        let replaced = table.get(key).map_or(0, |old| key.len() + old.len());
        let bytes = self.bytes - replaced + key.len() + value.len();
        if bytes > capacity {
            return Err(EngineError::full(format!(
                "{bytes} bytes exceeds capacity of {capacity}"
            )));
        }

        table.insert(key.to_vec(), value.to_vec());
        self.bytes = bytes;
        Ok(())
    }

    fn delete(&mut self, catalog: MemCatalog, key: &[u8]) -> bool {
        let Some(table) = self.tables.get_mut(&catalog) else {
            return false;
        };
        match table.remove(key) {
            Some(old) => {
                self.bytes -= key.len() + old.len();
                true
            }
            None => false,
        }
    }

    fn cursor(&self, catalog: MemCatalog) -> Box<dyn EngineCursor<'_> + '_> {
        Box::new(MemCursor {
            table: self.tables.get(&catalog),
            position: None,
            exhausted: false,
        })
    }
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    read_only: bool,
    capacity: usize,
    catalogs: Mutex<Vec<Option<String>>>,
    /// State visible to new transactions.
    committed: RwLock<Arc<Tables>>,
    /// State that survives a simulated crash.
    flushed: Mutex<Arc<Tables>>,
    writer: Mutex<()>,
}

/// An in-memory engine.
///
/// This engine keeps two states: the *committed* state seen by new
/// transactions and the *flushed* state that would survive a crash.
/// [`KvEngine::flush`] copies the former into the latter and
/// [`InMemoryEngine::simulate_crash`] starts a new engine from the flushed
/// state, which makes unflushed commits observable in tests.
///
/// The map size from [`EngineOptions`] is the byte capacity of the store,
/// counting key and value lengths.
///
/// # Thread Safety
///
/// Cloning shares the same underlying store. Readers see immutable snapshots;
/// one writer at a time holds the writer lock.
#[derive(Debug, Clone)]
pub struct InMemoryEngine {
    shared: Arc<Shared>,
}

impl InMemoryEngine {
    /// Creates an empty engine with default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(Path::new(":memory:"), &EngineOptions::default())
    }

    fn with_options(path: &Path, options: &EngineOptions) -> Self {
        Self::from_state(
            path.to_path_buf(),
            options.flags.read_only,
            options.map_size,
            Vec::new(),
            Arc::new(Tables::default()),
        )
    }

    fn from_state(
        path: PathBuf,
        read_only: bool,
        capacity: usize,
        catalogs: Vec<Option<String>>,
        state: Arc<Tables>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                path,
                read_only,
                capacity,
                catalogs: Mutex::new(catalogs),
                committed: RwLock::new(Arc::clone(&state)),
                flushed: Mutex::new(state),
                writer: Mutex::new(()),
            }),
        }
    }

    /// Returns a new engine holding only what was flushed.
    ///
    /// Commits since the last [`KvEngine::flush`] are lost, as they would be
    /// after a power failure. Catalog definitions are kept.
    #[must_use]
    pub fn simulate_crash(&self) -> Self {
        let flushed = Arc::clone(&self.shared.flushed.lock());
        Self::from_state(
            self.shared.path.clone(),
            self.shared.read_only,
            self.shared.capacity,
            self.shared.catalogs.lock().clone(),
            flushed,
        )
    }

    /// Returns true if every committed write has been flushed.
    #[must_use]
    pub fn is_flushed(&self) -> bool {
        let committed = Arc::clone(&self.shared.committed.read());
        Arc::ptr_eq(&committed, &self.shared.flushed.lock())
    }

    /// Returns the number of bytes held by the committed state.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.shared.committed.read().bytes
    }
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KvEngine for InMemoryEngine {
    type Catalog = MemCatalog;
    type ReadTxn<'env> = MemReadTxn<'env>;
    type WriteTxn<'env> = MemWriteTxn<'env>;

    fn open(path: &Path, options: &EngineOptions) -> EngineResult<Self> {
        Ok(Self::with_options(path, options))
    }

    fn path(&self) -> &Path {
        &self.shared.path
    }

    fn open_catalog(&self, name: Option<&str>, create: bool) -> EngineResult<MemCatalog> {
        let mut catalogs = self.shared.catalogs.lock();
        let wanted = name.map(str::to_owned);

        if let Some(index) = catalogs.iter().position(|existing| *existing == wanted) {
            return Ok(MemCatalog(index as u32));
        }
        if !create {
            return Err(EngineError::NotFound);
        }
        if self.shared.read_only {
            return Err(EngineError::ReadOnly);
        }

        catalogs.push(wanted);
        Ok(MemCatalog((catalogs.len() - 1) as u32))
    }

    fn begin_read(&self) -> EngineResult<MemReadTxn<'_>> {
        Ok(MemReadTxn {
            state: Arc::clone(&self.shared.committed.read()),
            _env: PhantomData,
        })
    }

    fn begin_write(&self) -> EngineResult<MemWriteTxn<'_>> {
        if self.shared.read_only {
            return Err(EngineError::ReadOnly);
        }
        let writer = self.shared.writer.lock();
        let state = Tables::clone(&self.shared.committed.read());
        Ok(MemWriteTxn {
            shared: &self.shared,
            state,
            _writer: writer,
        })
    }

    fn flush(&self) -> EngineResult<()> {
        let committed = Arc::clone(&self.shared.committed.read());
        *self.shared.flushed.lock() = committed;
        Ok(())
    }
}

/// A read-only snapshot of an [`InMemoryEngine`].
#[derive(Debug)]
pub struct MemReadTxn<'env> {
    state: Arc<Tables>,
    _env: PhantomData<&'env InMemoryEngine>,
}

impl EngineRead for MemReadTxn<'_> {
    type Catalog = MemCatalog;

    fn get(&self, catalog: MemCatalog, key: &[u8]) -> EngineResult<Option<&[u8]>> {
        Ok(self.state.get(catalog, key))
    }

    fn open_cursor(&self, catalog: MemCatalog) -> EngineResult<Box<dyn EngineCursor<'_> + '_>> {
        Ok(self.state.cursor(catalog))
    }
}

/// The single read-write transaction of an [`InMemoryEngine`].
#[derive(Debug)]
pub struct MemWriteTxn<'env> {
    shared: &'env Shared,
    state: Tables,
    _writer: MutexGuard<'env, ()>,
}

impl EngineRead for MemWriteTxn<'_> {
    type Catalog = MemCatalog;

    fn get(&self, catalog: MemCatalog, key: &[u8]) -> EngineResult<Option<&[u8]>> {
        Ok(self.state.get(catalog, key))
    }

    fn open_cursor(&self, catalog: MemCatalog) -> EngineResult<Box<dyn EngineCursor<'_> + '_>> {
        Ok(self.state.cursor(catalog))
    }
}

impl EngineWrite for MemWriteTxn<'_> {
    type Nested<'p>
        = MemNestedTxn<'p>
    where
        Self: 'p;

    fn put(
        &mut self,
        catalog: MemCatalog,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> EngineResult<()> {
        self.state.put(catalog, key, value, flags, self.shared.capacity)
    }

    fn delete(&mut self, catalog: MemCatalog, key: &[u8]) -> EngineResult<bool> {
        Ok(self.state.delete(catalog, key))
    }

    fn begin_nested(&mut self) -> EngineResult<MemNestedTxn<'_>> {
        Ok(MemNestedTxn {
            state: self.state.clone(),
            parent: &mut self.state,
            capacity: self.shared.capacity,
        })
    }

    fn commit(self) -> EngineResult<()> {
        let MemWriteTxn {
            shared,
            state,
            _writer,
        } = self;
        *shared.committed.write() = Arc::new(state);
        Ok(())
    }

    fn abort(self) {}
}

/// A transaction nested under a [`MemWriteTxn`] or another nested transaction.
#[derive(Debug)]
pub struct MemNestedTxn<'p> {
    parent: &'p mut Tables,
    state: Tables,
    capacity: usize,
}

impl EngineRead for MemNestedTxn<'_> {
    type Catalog = MemCatalog;

    fn get(&self, catalog: MemCatalog, key: &[u8]) -> EngineResult<Option<&[u8]>> {
        Ok(self.state.get(catalog, key))
    }

    fn open_cursor(&self, catalog: MemCatalog) -> EngineResult<Box<dyn EngineCursor<'_> + '_>> {
        Ok(self.state.cursor(catalog))
    }
}

impl EngineWrite for MemNestedTxn<'_> {
    type Nested<'q>
        = MemNestedTxn<'q>
    where
        Self: 'q;

    fn put(
        &mut self,
        catalog: MemCatalog,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> EngineResult<()> {
        self.state.put(catalog, key, value, flags, self.capacity)
    }

    fn delete(&mut self, catalog: MemCatalog, key: &[u8]) -> EngineResult<bool> {
        Ok(self.state.delete(catalog, key))
    }

    fn begin_nested(&mut self) -> EngineResult<MemNestedTxn<'_>> {
        Ok(MemNestedTxn {
            state: self.state.clone(),
            parent: &mut self.state,
            capacity: self.capacity,
        })
    }

    fn commit(self) -> EngineResult<()> {
        *self.parent = self.state;
        Ok(())
    }

    fn abort(self) {}
}

struct MemCursor<'txn> {
    table: Option<&'txn Table>,
    position: Option<&'txn [u8]>,
    /// Set once a move ran off the end; cleared by `first` or `seek`.
    exhausted: bool,
}

impl<'txn> MemCursor<'txn> {
    fn land(&mut self, lower: Bound<&[u8]>) -> EngineResult<Option<KeyValue<'txn>>> {
        let entry = self.table.and_then(|table| {
            table
                .range::<[u8], _>((lower, Bound::Unbounded))
                .next()
                .map(|(k, v)| (k.as_slice(), v.as_slice()))
        });
        match entry {
            Some((key, _)) => self.position = Some(key),
            None => self.exhausted = true,
        }
        Ok(entry)
    }
}

impl<'txn> EngineCursor<'txn> for MemCursor<'txn> {
    fn first(&mut self) -> EngineResult<Option<KeyValue<'txn>>> {
        self.exhausted = false;
        self.land(Bound::Unbounded)
    }

    fn seek(&mut self, key: &[u8]) -> EngineResult<Option<KeyValue<'txn>>> {
        self.exhausted = false;
        self.land(Bound::Included(key))
    }

    fn next(&mut self) -> EngineResult<Option<KeyValue<'txn>>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.position {
            Some(current) => self.land(Bound::Excluded(current)),
            None => self.first(),
        }
    }
}
