//! Environment directory management.
//!
//! An LMDB-style environment lives in a directory:
//!
//! ```text
//! <env_path>/
//! ├─ data.mdb          # Engine data file
//! ├─ lock.mdb          # Engine reader table
//! └─ REWIND.LOCK       # Advisory lock held by the owning handle
//! ```
//!
//! With `no_sub_dir` the path names the data file itself and the lock file is
//! `<env_path>.rewind-lock` next to it.
//!
//! Sequence counters are cached in the owning process, so only one handle
//! may write an environment at a time. Read-write opens take an exclusive
//! lock, read-only opens a shared one.

use crate::error::{RewindError, RewindResult};
use fs2::FileExt;
use rewind_engine::OpenFlags;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File name of the advisory lock inside an environment directory.
const LOCK_FILE: &str = "REWIND.LOCK";
/// Suffix of the advisory lock for single-file environments.
const LOCK_SUFFIX: &str = ".rewind-lock";

/// Holds the advisory lock of an open environment.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub(crate) struct EnvironmentDir {
    /// Lock file handle (held for the lifetime of the environment).
    _lock_file: Option<File>,
}

impl EnvironmentDir {
    /// Prepares `path` for the engine and acquires the advisory lock.
    ///
    /// # Errors
    ///
    /// Returns an `Open` error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path is not a directory (without `no_sub_dir`)
    /// - Another handle holds an incompatible lock
    pub(crate) fn open(
        path: &Path,
        flags: OpenFlags,
        create_if_missing: bool,
    ) -> RewindResult<Self> {
        let lock_path = if flags.no_sub_dir {
            Self::prepare_file(path)?
        } else {
            Self::prepare_dir(path, flags.read_only, create_if_missing)?
        };

        let lock_file = if flags.read_only {
            match OpenOptions::new().read(true).open(&lock_path) {
                Ok(file) => Some(file),
                // Never opened for writing, so there is no writer to exclude.
                Err(e) if e.kind() == io::ErrorKind::NotFound => None,
                Err(e) => return Err(RewindError::open(path, e.to_string())),
            }
        } else {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|e| RewindError::open(path, e.to_string()))?;
            Some(file)
        };

        if let Some(file) = &lock_file {
            let locked = if flags.read_only {
                FileExt::try_lock_shared(file)
            } else {
                FileExt::try_lock_exclusive(file)
            };
            if locked.is_err() {
                return Err(RewindError::open(
                    path,
                    "environment is locked by another handle",
                ));
            }
        }

        Ok(Self {
            _lock_file: lock_file,
        })
    }

    fn prepare_dir(path: &Path, read_only: bool, create_if_missing: bool) -> RewindResult<PathBuf> {
        if !path.exists() {
            if create_if_missing && !read_only {
                fs::create_dir_all(path).map_err(|e| RewindError::open(path, e.to_string()))?;
            } else {
                return Err(RewindError::open(path, "environment directory does not exist"));
            }
        }

        if !path.is_dir() {
            return Err(RewindError::open(path, "path is not a directory"));
        }

        Ok(path.join(LOCK_FILE))
    }

    fn prepare_file(path: &Path) -> RewindResult<PathBuf> {
        if path.is_dir() {
            return Err(RewindError::open(
                path,
                "path is a directory but no_sub_dir was requested",
            ));
        }

        let mut lock_name = path.as_os_str().to_owned();
        lock_name.push(LOCK_SUFFIX);
        Ok(PathBuf::from(lock_name))
    }
}
