//! Environment configuration.

use rewind_engine::{EngineOptions, OpenFlags};

/// When a write commit is confirmed durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// Flush the engine on every write commit. `durable` tracks `current`.
    #[default]
    Immediate,
    /// Leave flushing to [`crate::Environment::sync`] or close. Commits in
    /// between form the rewindable gap.
    Deferred,
}

/// Configuration for an environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// When write commits become durable.
    pub durability: Durability,

    /// Size of the engine's memory map, which bounds the store size.
    pub map_size: usize,

    /// Maximum number of concurrent read transactions.
    pub max_readers: u32,

    /// Maximum number of named catalogs, not counting the metadata catalog.
    pub max_catalogs: u32,

    /// Whether to create the environment directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            durability: Durability::Immediate,
            map_size: 10 * 1024 * 1024, // 10 MB
            max_readers: 126,
            max_catalogs: 8,
            create_if_missing: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the durability mode.
    #[must_use]
    pub const fn durability(mut self, value: Durability) -> Self {
        self.durability = value;
        self
    }

    /// Sets the memory map size.
    #[must_use]
    pub const fn map_size(mut self, size: usize) -> Self {
        self.map_size = size;
        self
    }

    /// Sets the maximum number of readers.
    #[must_use]
    pub const fn max_readers(mut self, value: u32) -> Self {
        self.max_readers = value;
        self
    }

    /// Sets the maximum number of named catalogs.
    #[must_use]
    pub const fn max_catalogs(mut self, value: u32) -> Self {
        self.max_catalogs = value;
        self
    }

    /// Sets whether to create the environment directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Engine options for an open with `flags` and file `mode`.
    ///
    /// The engine never syncs on its own commit. Durable points are set
    /// only by explicit flushes: after each write commit under
    /// [`Durability::Immediate`], and on sync or close under
    /// [`Durability::Deferred`].
    pub(crate) fn engine_options(&self, flags: OpenFlags, mode: u32) -> EngineOptions {
        EngineOptions {
            flags: flags.no_sync(true),
            mode,
            map_size: self.map_size,
            max_readers: self.max_readers,
            // One extra slot for the metadata catalog.
            max_catalogs: self.max_catalogs + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.durability, Durability::Immediate);
        assert!(config.create_if_missing);
        assert_eq!(config.max_catalogs, 8);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .durability(Durability::Deferred)
            .create_if_missing(false)
            .map_size(1 << 31)
            .max_catalogs(1);

        assert_eq!(config.durability, Durability::Deferred);
        assert!(!config.create_if_missing);
        assert_eq!(config.map_size, 1 << 31);
        assert_eq!(config.max_catalogs, 1);
    }

    #[test]
    fn engine_options_reserve_metadata_catalog() {
        let options = Config::new()
            .max_catalogs(1)
            .engine_options(OpenFlags::empty(), 0o600);
        assert_eq!(options.max_catalogs, 2);
        assert_eq!(options.mode, 0o600);
    }

    #[test]
    fn engine_commits_never_sync_on_their_own() {
        for durability in [Durability::Immediate, Durability::Deferred] {
            let options = Config::new()
                .durability(durability)
                .engine_options(OpenFlags { no_read_ahead: true, ..OpenFlags::empty() }, 0o644);
            assert!(options.flags.no_sync, "{durability:?}");
            assert!(options.flags.no_read_ahead, "{durability:?}");
            assert!(!options.flags.read_only, "{durability:?}");
        }
    }
}
