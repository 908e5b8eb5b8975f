//! Failure injection for engines.
//!
//! [`FaultyEngine`] wraps any [`KvEngine`] and forwards every call, except
//! that flushes can be made to fail on demand through a shared
//! [`FaultInjector`]. The injector stays with the test while the engine is
//! moved into an environment.
//!
//! ```rust
//! use rewind_core::{Config, Environment, RewindError};
//! use rewind_engine::InMemoryEngine;
//! use rewind_testkit::FaultyEngine;
//!
//! let engine = FaultyEngine::new(InMemoryEngine::new());
//! let faults = engine.injector();
//! let env = Environment::with_engine(engine, Config::default()).unwrap();
//! let root = env.open_catalog(None).unwrap();
//!
//! faults.set_fail_on_flush(true);
//! let mut txn = env.begin_write().unwrap();
//! txn.put(&root, b"k", b"v").unwrap();
//! assert!(matches!(txn.commit(), Err(RewindError::Io(_))));
//! assert_eq!(env.last_durable_sequence().unwrap().as_u64(), 0);
//! ```

use rewind_engine::{EngineError, EngineOptions, EngineResult, KvEngine};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct FaultState {
    fail_on_flush: AtomicBool,
    flushes: AtomicUsize,
    failed_flushes: AtomicUsize,
}

/// Shared switchboard for a [`FaultyEngine`].
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    state: Arc<FaultState>,
}

impl FaultInjector {
    /// Creates an injector with every fault disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether flush should fail.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.state.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Number of flushes attempted, failed ones included.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.state.flushes.load(Ordering::SeqCst)
    }

    /// Number of flushes that were made to fail.
    #[must_use]
    pub fn failed_flush_count(&self) -> usize {
        self.state.failed_flushes.load(Ordering::SeqCst)
    }

    /// Disables every fault and clears the counters.
    pub fn reset(&self) {
        self.state.fail_on_flush.store(false, Ordering::SeqCst);
        self.state.flushes.store(0, Ordering::SeqCst);
        self.state.failed_flushes.store(0, Ordering::SeqCst);
    }

    fn before_flush(&self) -> EngineResult<()> {
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_on_flush.load(Ordering::SeqCst) {
            self.state.failed_flushes.fetch_add(1, Ordering::SeqCst);
            return Err(EngineError::Io(io::Error::new(
                io::ErrorKind::Other,
                "injected flush failure",
            )));
        }
        Ok(())
    }
}

/// An engine wrapper that can fail flushes.
#[derive(Debug)]
pub struct FaultyEngine<E> {
    inner: E,
    faults: FaultInjector,
}

impl<E: KvEngine> FaultyEngine<E> {
    /// Wraps `inner` with a fresh injector.
    pub fn new(inner: E) -> Self {
        Self::with_injector(inner, FaultInjector::new())
    }

    /// Wraps `inner`, sharing an existing injector.
    pub fn with_injector(inner: E, faults: FaultInjector) -> Self {
        Self { inner, faults }
    }

    /// Returns a handle to this engine's injector.
    #[must_use]
    pub fn injector(&self) -> FaultInjector {
        self.faults.clone()
    }

    /// Returns the wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: KvEngine> KvEngine for FaultyEngine<E> {
    type Catalog = E::Catalog;
    type ReadTxn<'env>
        = E::ReadTxn<'env>
    where
        Self: 'env;
    type WriteTxn<'env>
        = E::WriteTxn<'env>
    where
        Self: 'env;

    fn open(path: &Path, options: &EngineOptions) -> EngineResult<Self> {
        Ok(Self::new(E::open(path, options)?))
    }

    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn open_catalog(&self, name: Option<&str>, create: bool) -> EngineResult<Self::Catalog> {
        self.inner.open_catalog(name, create)
    }

    fn begin_read(&self) -> EngineResult<Self::ReadTxn<'_>> {
        self.inner.begin_read()
    }

    fn begin_write(&self) -> EngineResult<Self::WriteTxn<'_>> {
        self.inner.begin_write()
    }

    fn flush(&self) -> EngineResult<()> {
        self.faults.before_flush()?;
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_engine::{EngineWrite, InMemoryEngine, PutFlags};

    #[test]
    fn flush_forwards_until_failure_is_injected() {
        let engine = FaultyEngine::new(InMemoryEngine::new());
        let faults = engine.injector();

        engine.flush().unwrap();
        faults.set_fail_on_flush(true);
        assert!(matches!(engine.flush(), Err(EngineError::Io(_))));

        assert_eq!(faults.flush_count(), 2);
        assert_eq!(faults.failed_flush_count(), 1);

        faults.reset();
        engine.flush().unwrap();
        assert_eq!(faults.flush_count(), 1);
    }

    #[test]
    fn injected_failure_leaves_inner_unflushed() {
        let inner = InMemoryEngine::new();
        let engine = FaultyEngine::new(inner.clone());
        let table = engine.open_catalog(Some("t"), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(table, b"k", b"v", PutFlags::empty()).unwrap();
        txn.commit().unwrap();

        engine.injector().set_fail_on_flush(true);
        assert!(engine.flush().is_err());
        assert!(!inner.is_flushed());
    }
}
