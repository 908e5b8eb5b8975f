//! LMDB engine.

use crate::engine::{EngineCursor, EngineRead, EngineWrite, KeyValue, KvEngine};
use crate::error::{EngineError, EngineResult};
use crate::options::{EngineOptions, PutFlags};
use lmdb::{
    Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, RoCursor, RoTransaction,
    RwTransaction, Transaction,
};
use lmdb_sys::{MDB_FIRST, MDB_NEXT, MDB_SET_RANGE};
use std::os::raw::c_uint;
use std::fmt;
use std::path::{Path, PathBuf};

/// An LMDB environment.
///
/// Catalogs are LMDB named databases (`None` is the unnamed root database,
/// which also lists the names of every named database).
///
/// The environment is always opened with `MDB_NOTLS`: reader slots belong to
/// transactions, not threads, so one thread may hold several readers.
///
/// # Example
///
/// ```rust,no_run
/// use rewind_engine::{EngineOptions, KvEngine, LmdbEngine};
/// use std::path::Path;
///
/// let engine = LmdbEngine::open(Path::new("/tmp/lmdb-test"), &EngineOptions::default()).unwrap();
/// let root = engine.open_catalog(None, true).unwrap();
/// ```
pub struct LmdbEngine {
    env: Environment,
    path: PathBuf,
}

impl LmdbEngine {
    /// Returns the underlying LMDB environment.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }
}

impl fmt::Debug for LmdbEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LmdbEngine")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KvEngine for LmdbEngine {
    type Catalog = Database;
    type ReadTxn<'env> = LmdbReadTxn<'env>;
    type WriteTxn<'env> = LmdbWriteTxn<'env>;

    fn open(path: &Path, options: &EngineOptions) -> EngineResult<Self> {
        let mut builder = Environment::new();
        builder.set_flags(options.flags.to_lmdb() | EnvironmentFlags::NO_TLS);
        builder.set_max_dbs(options.max_catalogs);
        builder.set_map_size(options.map_size);
        builder.set_max_readers(options.max_readers);

        let env = builder.open_with_permissions(path, options.mode as _)?;

        Ok(Self {
            env,
            path: path.to_path_buf(),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn open_catalog(&self, name: Option<&str>, create: bool) -> EngineResult<Database> {
        let db = if create {
            self.env.create_db(name, DatabaseFlags::empty())?
        } else {
            self.env.open_db(name)?
        };
        Ok(db)
    }

    fn begin_read(&self) -> EngineResult<LmdbReadTxn<'_>> {
        Ok(LmdbReadTxn(self.env.begin_ro_txn()?))
    }

    fn begin_write(&self) -> EngineResult<LmdbWriteTxn<'_>> {
        Ok(LmdbWriteTxn(self.env.begin_rw_txn()?))
    }

    fn flush(&self) -> EngineResult<()> {
        self.env.sync(true)?;
        Ok(())
    }
}

/// A read-only LMDB transaction.
pub struct LmdbReadTxn<'env>(RoTransaction<'env>);

/// A read-write LMDB transaction (top-level or nested).
pub struct LmdbWriteTxn<'env>(RwTransaction<'env>);

fn lookup<'txn, T: Transaction>(
    txn: &'txn T,
    db: Database,
    key: &[u8],
) -> EngineResult<Option<&'txn [u8]>> {
    match txn.get(db, &key) {
        Ok(value) => Ok(Some(value)),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl EngineRead for LmdbReadTxn<'_> {
    type Catalog = Database;

    fn get(&self, catalog: Database, key: &[u8]) -> EngineResult<Option<&[u8]>> {
        lookup(&self.0, catalog, key)
    }

    fn open_cursor(&self, catalog: Database) -> EngineResult<Box<dyn EngineCursor<'_> + '_>> {
        Ok(Box::new(LmdbCursor::new(self.0.open_ro_cursor(catalog)?)))
    }
}

impl EngineRead for LmdbWriteTxn<'_> {
    type Catalog = Database;

    fn get(&self, catalog: Database, key: &[u8]) -> EngineResult<Option<&[u8]>> {
        lookup(&self.0, catalog, key)
    }

    fn open_cursor(&self, catalog: Database) -> EngineResult<Box<dyn EngineCursor<'_> + '_>> {
        Ok(Box::new(LmdbCursor::new(self.0.open_ro_cursor(catalog)?)))
    }
}

impl<'env> EngineWrite for LmdbWriteTxn<'env> {
    type Nested<'p>
        = LmdbWriteTxn<'p>
    where
        Self: 'p;

    fn put(
        &mut self,
        catalog: Database,
        key: &[u8],
        value: &[u8],
        flags: PutFlags,
    ) -> EngineResult<()> {
        self.0.put(catalog, &key, &value, flags.to_lmdb())?;
        Ok(())
    }

    fn delete(&mut self, catalog: Database, key: &[u8]) -> EngineResult<bool> {
        match self.0.del(catalog, &key, None) {
            Ok(()) => Ok(true),
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn begin_nested(&mut self) -> EngineResult<LmdbWriteTxn<'_>> {
        Ok(LmdbWriteTxn(self.0.begin_nested_txn()?))
    }

    fn commit(self) -> EngineResult<()> {
        self.0.commit().map_err(EngineError::from)
    }

    fn abort(self) {
        self.0.abort();
    }
}

/// A cursor over an LMDB database.
pub struct LmdbCursor<'txn> {
    cursor: RoCursor<'txn>,
    position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Unpositioned,
    Entry,
    End,
}

impl<'txn> LmdbCursor<'txn> {
    fn new(cursor: RoCursor<'txn>) -> Self {
        Self {
            cursor,
            position: Position::Unpositioned,
        }
    }

    fn step(&mut self, key: Option<&[u8]>, op: c_uint) -> EngineResult<Option<KeyValue<'txn>>> {
        match self.cursor.get(key, None, op) {
            Ok((Some(key), value)) => {
                self.position = Position::Entry;
                Ok(Some((key, value)))
            }
            Ok((None, _)) => Err(EngineError::Corrupted(
                "cursor positioned without a key".to_string(),
            )),
            Err(lmdb::Error::NotFound) => {
                self.position = Position::End;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<'txn> EngineCursor<'txn> for LmdbCursor<'txn> {
    fn first(&mut self) -> EngineResult<Option<KeyValue<'txn>>> {
        self.step(None, MDB_FIRST)
    }

    fn seek(&mut self, key: &[u8]) -> EngineResult<Option<KeyValue<'txn>>> {
        self.step(Some(key), MDB_SET_RANGE)
    }

    fn next(&mut self) -> EngineResult<Option<KeyValue<'txn>>> {
        match self.position {
            Position::Unpositioned => self.first(),
            Position::Entry => self.step(None, MDB_NEXT),
            Position::End => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_engine() -> (TempDir, LmdbEngine) {
        let dir = TempDir::new().unwrap();
        let engine = LmdbEngine::open(dir.path(), &EngineOptions::default()).unwrap();
        (dir, engine)
    }

    #[test]
    fn put_commit_get() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(db, b"k1", b"v1", PutFlags::empty()).unwrap();
        txn.commit().unwrap();

        let txn = engine.begin_read().unwrap();
        assert_eq!(txn.get(db, b"k1").unwrap(), Some(&b"v1"[..]));
        assert_eq!(txn.get(db, b"missing").unwrap(), None);
    }

    #[test]
    fn abort_discards_writes() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(db, b"k1", b"v1", PutFlags::empty()).unwrap();
        txn.abort();

        let txn = engine.begin_read().unwrap();
        assert_eq!(txn.get(db, b"k1").unwrap(), None);
    }

    #[test]
    fn missing_catalog_without_create_is_not_found() {
        let (_dir, engine) = open_engine();
        let result = engine.open_catalog(Some("absent"), false);
        assert!(matches!(result, Err(EngineError::NotFound)));
    }

    #[test]
    fn no_overwrite_reports_key_exists() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(db, b"k", b"a", PutFlags::empty()).unwrap();
        let result = txn.put(db, b"k", b"b", PutFlags::empty().no_overwrite(true));
        assert!(matches!(result, Err(EngineError::KeyExists)));
    }

    #[test]
    fn delete_reports_existence() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(db, b"k", b"v", PutFlags::empty()).unwrap();
        assert!(txn.delete(db, b"k").unwrap());
        assert!(!txn.delete(db, b"k").unwrap());
    }

    #[test]
    fn nested_commit_reaches_parent() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        {
            let mut child = txn.begin_nested().unwrap();
            child.put(db, b"child", b"1", PutFlags::empty()).unwrap();
            child.commit().unwrap();
        }
        {
            let mut child = txn.begin_nested().unwrap();
            child.put(db, b"aborted", b"1", PutFlags::empty()).unwrap();
            child.abort();
        }
        assert_eq!(txn.get(db, b"child").unwrap(), Some(&b"1"[..]));
        assert_eq!(txn.get(db, b"aborted").unwrap(), None);
        txn.commit().unwrap();
    }

    #[test]
    fn cursor_walks_in_key_order() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        for key in [&b"c"[..], &b"a"[..], &b"b"[..]] {
            txn.put(db, key, key, PutFlags::empty()).unwrap();
        }
        txn.commit().unwrap();

        let txn = engine.begin_read().unwrap();
        let mut cursor = txn.open_cursor(db).unwrap();
        assert_eq!(cursor.first().unwrap().map(|(k, _)| k), Some(&b"a"[..]));
        assert_eq!(cursor.next().unwrap().map(|(k, _)| k), Some(&b"b"[..]));
        assert_eq!(cursor.next().unwrap().map(|(k, _)| k), Some(&b"c"[..]));
        assert_eq!(cursor.next().unwrap(), None);

        assert_eq!(cursor.seek(b"bb").unwrap().map(|(k, _)| k), Some(&b"c"[..]));
    }

    #[test]
    fn cursor_on_empty_database_returns_none() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("empty"), true).unwrap();

        let txn = engine.begin_read().unwrap();
        let mut cursor = txn.open_cursor(db).unwrap();
        assert_eq!(cursor.first().unwrap(), None);
        assert_eq!(cursor.next().unwrap(), None);
        assert_eq!(cursor.seek(b"a").unwrap(), None);
    }

    #[test]
    fn cursor_seek_past_last_key_returns_none() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(db, b"a", b"1", PutFlags::empty()).unwrap();
        txn.commit().unwrap();

        let txn = engine.begin_read().unwrap();
        let mut cursor = txn.open_cursor(db).unwrap();
        assert_eq!(cursor.seek(b"zzz").unwrap(), None);
        assert_eq!(cursor.next().unwrap(), None);
        assert_eq!(cursor.seek(b"a").unwrap(), Some((&b"a"[..], &b"1"[..])));
        assert_eq!(cursor.next().unwrap(), None);
    }

    #[test]
    fn unpositioned_next_starts_at_first() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(db, b"b", b"2", PutFlags::empty()).unwrap();
        txn.put(db, b"a", b"1", PutFlags::empty()).unwrap();
        txn.commit().unwrap();

        let txn = engine.begin_read().unwrap();
        let mut cursor = txn.open_cursor(db).unwrap();
        assert_eq!(cursor.next().unwrap().map(|(k, _)| k), Some(&b"a"[..]));
        assert_eq!(cursor.next().unwrap().map(|(k, _)| k), Some(&b"b"[..]));
    }

    #[test]
    fn one_thread_holds_several_readers() {
        let (_dir, engine) = open_engine();
        let db = engine.open_catalog(Some("table"), true).unwrap();

        let first = engine.begin_read().unwrap();
        let second = engine.begin_read().unwrap();
        assert_eq!(first.get(db, b"k").unwrap(), None);
        assert_eq!(second.get(db, b"k").unwrap(), None);
    }

    #[test]
    fn flush_succeeds() {
        let (_dir, engine) = open_engine();
        assert!(engine.flush().is_ok());
    }

    #[test]
    fn map_full_is_reported_as_full() {
        let dir = TempDir::new().unwrap();
        let options = EngineOptions {
            map_size: 64 * 1024,
            ..EngineOptions::default()
        };
        let engine = LmdbEngine::open(dir.path(), &options).unwrap();
        let db = engine.open_catalog(None, true).unwrap();

        let value = vec![7u8; 1024];
        let mut txn = engine.begin_write().unwrap();
        let mut failure = None;
        for i in 0u32..1024 {
            if let Err(e) = txn.put(db, &i.to_be_bytes(), &value, PutFlags::empty()) {
                failure = Some(e);
                break;
            }
        }
        assert!(matches!(failure, Some(EngineError::Full(_))));
    }
}
