//! Error types for Rewind environments.

use rewind_engine::EngineError;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type for environment operations.
pub type RewindResult<T> = Result<T, RewindError>;

/// Errors that can occur while operating a sequence-tracked environment.
///
/// [`RewindError::NotFound`] is the one expected outcome: it is what `get`
/// returns for an absent key and callers usually handle it inline. Every
/// other variant aborts the operation in progress.
#[derive(Debug, Error)]
pub enum RewindError {
    /// The engine could not allocate its environment object.
    #[error("engine allocation failed")]
    Allocation,

    /// The environment could not be opened.
    #[error("cannot open environment at {path}: {message}")]
    Open {
        /// The path that was being opened.
        path: String,
        /// Why the open failed.
        message: String,
    },

    /// The store was written by an incompatible format version.
    #[error("version mismatch: {message}")]
    VersionMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// No further transactions can be started.
    #[error("transaction limit reached: {message}")]
    TransactionLimit {
        /// Engine description of the limit.
        message: String,
    },

    /// The key is absent.
    #[error("key not found")]
    NotFound,

    /// A write was issued through a read-only transaction or environment.
    #[error("write attempted in a read-only transaction")]
    ReadOnlyViolation,

    /// The backing store is full.
    #[error("store is full: {message}")]
    Capacity {
        /// Engine description of the exhausted resource.
        message: String,
    },

    /// The transaction was invalidated by a concurrent writer.
    #[error("commit conflict: {message}")]
    CommitConflict {
        /// Engine description of the conflict.
        message: String,
    },

    /// I/O error, including a failed flush to stable storage.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The environment's cursor slot is already taken.
    #[error("cursor already in use")]
    CursorInUse,

    /// A no-overwrite or append put found the key already present.
    #[error("key already exists")]
    KeyExists,

    /// The catalog was released with `close_catalog`.
    #[error("catalog {name} has been closed")]
    CatalogClosed {
        /// Display name of the catalog.
        name: String,
    },

    /// The catalog does not exist and could not be created.
    #[error("catalog not found: {name}")]
    CatalogNotFound {
        /// Display name of the catalog.
        name: String,
    },

    /// The store is corrupted.
    #[error("store corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// The environment is not open.
    #[error("environment is not open")]
    NotOpen,
}

impl RewindError {
    /// Creates an open error for `path`.
    pub fn open(path: &Path, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Creates a version mismatch error.
    pub fn version_mismatch(message: impl Into<String>) -> Self {
        Self::VersionMismatch {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this is the expected [`RewindError::NotFound`] outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Maps an engine failure raised while opening `path`.
    pub(crate) fn from_open(path: &Path, err: EngineError) -> Self {
        match err {
            EngineError::OutOfMemory => Self::Allocation,
            EngineError::VersionMismatch(message) => Self::VersionMismatch { message },
            EngineError::Io(e) => Self::open(path, e.to_string()),
            EngineError::Corrupted(message) | EngineError::Invalid(message) => {
                Self::open(path, message)
            }
            other => other.into(),
        }
    }

    /// Maps an engine failure raised while flushing to stable storage.
    ///
    /// Every flush failure surfaces as [`RewindError::Io`].
    pub(crate) fn from_flush(err: EngineError) -> Self {
        match err {
            EngineError::Io(e) => Self::Io(e),
            other => Self::Io(io::Error::new(io::ErrorKind::Other, other.to_string())),
        }
    }
}

impl From<EngineError> for RewindError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Io(e) => Self::Io(e),
            EngineError::NotFound => Self::NotFound,
            EngineError::KeyExists => Self::KeyExists,
            EngineError::Full(message) => Self::Capacity { message },
            EngineError::TooManyTransactions(message) => Self::TransactionLimit { message },
            EngineError::VersionMismatch(message) => Self::VersionMismatch { message },
            EngineError::Corrupted(message) => Self::Corrupted { message },
            EngineError::OutOfMemory => Self::Allocation,
            EngineError::Conflict(message) => Self::CommitConflict { message },
            EngineError::ReadOnly => Self::ReadOnlyViolation,
            EngineError::Invalid(message) => Self::InvalidOperation { message },
        }
    }
}
