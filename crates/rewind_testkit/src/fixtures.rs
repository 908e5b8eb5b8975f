//! Test fixtures and environment helpers.
//!
//! [`TestEnvironment`] is an LMDB environment in a temporary directory that
//! can be closed and reopened. [`MemoryEnvironment`] runs on the in-memory
//! engine behind a [`FaultyEngine`] and can simulate an unclean restart.

use crate::faulty::{FaultInjector, FaultyEngine};
use rewind_core::{Config, Durability, Environment, LmdbEngine, RewindResult, SequenceNumber};
use rewind_engine::InMemoryEngine;
use std::path::Path;
use tempfile::TempDir;

/// An on-disk test environment with automatic cleanup.
pub struct TestEnvironment {
    /// The environment instance.
    pub env: Environment<LmdbEngine>,
    config: Config,
    // Declared last so the environment closes before the directory goes away.
    temp_dir: TempDir,
}

impl TestEnvironment {
    /// Creates an environment with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an environment with `config`.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let env = Environment::open_path(temp_dir.path(), config.clone())
            .expect("Failed to open test environment");
        Self {
            env,
            config,
            temp_dir,
        }
    }

    /// Returns the environment directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Closes the environment and opens it again from disk.
    ///
    /// # Errors
    ///
    /// Returns the error of the close or the reopen.
    pub fn reopen(&mut self) -> RewindResult<()> {
        self.env.close()?;
        self.env = Environment::open_path(self.temp_dir.path(), self.config.clone())?;
        Ok(())
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestEnvironment {
    type Target = Environment<LmdbEngine>;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

impl std::ops::DerefMut for TestEnvironment {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.env
    }
}

/// An in-memory environment with flush failure injection.
pub struct MemoryEnvironment {
    /// The environment instance.
    pub env: Environment<FaultyEngine<InMemoryEngine>>,
    /// Fault switchboard shared with the engine.
    pub faults: FaultInjector,
    engine: InMemoryEngine,
    config: Config,
}

impl MemoryEnvironment {
    /// Creates an environment with `config`.
    pub fn new(config: Config) -> Self {
        let engine = InMemoryEngine::new();
        let faults = FaultInjector::new();
        let env = Self::open(engine.clone(), faults.clone(), config.clone());
        Self {
            env,
            faults,
            engine,
            config,
        }
    }

    /// Creates an environment that flushes on every commit.
    pub fn immediate() -> Self {
        Self::new(Config::new().durability(Durability::Immediate))
    }

    /// Creates an environment that flushes only on sync and close.
    pub fn deferred() -> Self {
        Self::new(Config::new().durability(Durability::Deferred))
    }

    /// Returns the underlying engine of the current incarnation.
    pub fn engine(&self) -> &InMemoryEngine {
        &self.engine
    }

    /// Simulates a power failure followed by a restart.
    ///
    /// Everything not flushed is lost. The returned value is the durable
    /// sequence the environment had just before the crash.
    pub fn crash_and_recover(&mut self) -> SequenceNumber {
        let before = self
            .env
            .last_durable_sequence()
            .expect("environment should be open");

        // Snapshot first: dropping the old environment closes it, which
        // flushes the old engine.
        let survivor = self.engine.simulate_crash();
        self.faults.reset();
        self.env = Self::open(survivor.clone(), self.faults.clone(), self.config.clone());
        self.engine = survivor;
        before
    }

    /// Closes the environment cleanly and opens it again.
    ///
    /// # Errors
    ///
    /// Returns the error of the close.
    pub fn reopen(&mut self) -> RewindResult<()> {
        self.env.close()?;
        let survivor = self.engine.simulate_crash();
        self.env = Self::open(survivor.clone(), self.faults.clone(), self.config.clone());
        self.engine = survivor;
        Ok(())
    }

    fn open(
        engine: InMemoryEngine,
        faults: FaultInjector,
        config: Config,
    ) -> Environment<FaultyEngine<InMemoryEngine>> {
        Environment::with_engine(FaultyEngine::with_injector(engine, faults), config)
            .expect("Failed to open in-memory environment")
    }
}

impl Default for MemoryEnvironment {
    fn default() -> Self {
        Self::immediate()
    }
}

impl std::ops::Deref for MemoryEnvironment {
    type Target = Environment<FaultyEngine<InMemoryEngine>>;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

/// Runs a test with a temporary on-disk environment.
pub fn with_temp_env<F, R>(f: F) -> R
where
    F: FnOnce(&Environment<LmdbEngine>) -> R,
{
    let fixture = TestEnvironment::new();
    f(&fixture.env)
}

/// Runs a test with an in-memory environment.
pub fn with_memory_env<F, R>(config: Config, f: F) -> R
where
    F: FnOnce(&Environment<FaultyEngine<InMemoryEngine>>, &FaultInjector) -> R,
{
    let fixture = MemoryEnvironment::new(config);
    f(&fixture.env, &fixture.faults)
}
