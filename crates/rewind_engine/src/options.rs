//! Engine open options and write flags.

/// Access flags applied when an environment is opened.
///
/// These are passed through unchanged to the engine's own conventions. For
/// LMDB each field corresponds to the `MDB_*` environment flag of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Open the environment read-only.
    pub read_only: bool,
    /// Treat the path as the data file itself instead of a directory.
    pub no_sub_dir: bool,
    /// Don't flush system buffers on commit.
    pub no_sync: bool,
    /// Flush system buffers on commit but omit the metadata flush.
    pub no_meta_sync: bool,
    /// Use a writeable memory map.
    pub write_map: bool,
    /// Don't do any engine-level locking.
    pub no_lock: bool,
    /// Turn off OS read-ahead on the memory map.
    pub no_read_ahead: bool,
}

impl OpenFlags {
    /// Returns flags with every option off.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            read_only: false,
            no_sub_dir: false,
            no_sync: false,
            no_meta_sync: false,
            write_map: false,
            no_lock: false,
            no_read_ahead: false,
        }
    }

    /// Sets the read-only flag.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the no-subdirectory flag.
    #[must_use]
    pub const fn no_sub_dir(mut self, value: bool) -> Self {
        self.no_sub_dir = value;
        self
    }

    /// Sets the no-sync flag.
    #[must_use]
    pub const fn no_sync(mut self, value: bool) -> Self {
        self.no_sync = value;
        self
    }

    /// Sets the no-meta-sync flag.
    #[must_use]
    pub const fn no_meta_sync(mut self, value: bool) -> Self {
        self.no_meta_sync = value;
        self
    }

    /// Sets the write-map flag.
    #[must_use]
    pub const fn write_map(mut self, value: bool) -> Self {
        self.write_map = value;
        self
    }

    pub(crate) fn to_lmdb(self) -> lmdb::EnvironmentFlags {
        use lmdb::EnvironmentFlags as F;

        let mut flags = F::empty();
        if self.read_only {
            flags.insert(F::READ_ONLY);
        }
        if self.no_sub_dir {
            flags.insert(F::NO_SUB_DIR);
        }
        if self.no_sync {
            flags.insert(F::NO_SYNC);
        }
        if self.no_meta_sync {
            flags.insert(F::NO_META_SYNC);
        }
        if self.write_map {
            flags.insert(F::WRITE_MAP);
        }
        if self.no_lock {
            flags.insert(F::NO_LOCK);
        }
        if self.no_read_ahead {
            flags.insert(F::NO_READAHEAD);
        }
        flags
    }
}

/// Flags for a single put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PutFlags {
    /// Fail with `KeyExists` instead of overwriting an existing key.
    pub no_overwrite: bool,
    /// The key sorts after every existing key; fail with `KeyExists` otherwise.
    pub append: bool,
}

impl PutFlags {
    /// Returns flags with every option off (plain insert-or-overwrite).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            no_overwrite: false,
            append: false,
        }
    }

    /// Sets the no-overwrite flag.
    #[must_use]
    pub const fn no_overwrite(mut self, value: bool) -> Self {
        self.no_overwrite = value;
        self
    }

    /// Sets the append flag.
    #[must_use]
    pub const fn append(mut self, value: bool) -> Self {
        self.append = value;
        self
    }

    pub(crate) fn to_lmdb(self) -> lmdb::WriteFlags {
        let mut flags = lmdb::WriteFlags::empty();
        if self.no_overwrite {
            flags.insert(lmdb::WriteFlags::NO_OVERWRITE);
        }
        if self.append {
            flags.insert(lmdb::WriteFlags::APPEND);
        }
        flags
    }
}

/// Everything an engine needs to open an environment.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Access flags.
    pub flags: OpenFlags,
    /// Unix permission bits for files the engine creates.
    pub mode: u32,
    /// Size of the memory map, which bounds the size of the store.
    pub map_size: usize,
    /// Maximum number of concurrent read transactions.
    pub max_readers: u32,
    /// Maximum number of named catalogs.
    pub max_catalogs: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            flags: OpenFlags::empty(),
            mode: 0o644,
            map_size: 10 * 1024 * 1024, // 10 MB, LMDB's default
            max_readers: 126,
            max_catalogs: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_flags_map_to_empty_lmdb_flags() {
        assert!(OpenFlags::empty().to_lmdb().is_empty());
        assert!(PutFlags::empty().to_lmdb().is_empty());
    }

    #[test]
    fn open_flags_builder() {
        let flags = OpenFlags::empty().read_only(true).no_sync(true);
        let lmdb_flags = flags.to_lmdb();
        assert!(lmdb_flags.contains(lmdb::EnvironmentFlags::READ_ONLY));
        assert!(lmdb_flags.contains(lmdb::EnvironmentFlags::NO_SYNC));
        assert!(!lmdb_flags.contains(lmdb::EnvironmentFlags::NO_SUB_DIR));
    }

    #[test]
    fn put_flags_builder() {
        let flags = PutFlags::empty().no_overwrite(true);
        assert!(flags.to_lmdb().contains(lmdb::WriteFlags::NO_OVERWRITE));
        assert!(!flags.to_lmdb().contains(lmdb::WriteFlags::APPEND));
    }
}
