//! Error types for engine operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by a key-value engine.
///
/// Engines classify their native failures into these categories so that the
/// sequence-tracking layer can map them without knowing engine internals.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key or catalog does not exist.
    #[error("not found")]
    NotFound,

    /// The key exists and the write asked not to overwrite it.
    #[error("key already exists")]
    KeyExists,

    /// The store (or a per-transaction structure) has no room left.
    #[error("store is full: {0}")]
    Full(String),

    /// No further readers or transactions can be started.
    #[error("transaction limit reached: {0}")]
    TooManyTransactions(String),

    /// The on-disk format was written by an incompatible engine version.
    #[error("version mismatch: {0}")]
    VersionMismatch(String),

    /// The store is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The engine could not allocate memory for its own objects.
    #[error("out of memory")]
    OutOfMemory,

    /// The transaction was invalidated and must be aborted.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// A write was attempted through a read-only handle.
    #[error("environment is read-only")]
    ReadOnly,

    /// The engine rejected the arguments of a call.
    #[error("invalid argument: {0}")]
    Invalid(String),
}

impl EngineError {
    /// Creates a store-full error.
    pub fn full(message: impl Into<String>) -> Self {
        Self::Full(message.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Returns true if this error is [`EngineError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<lmdb::Error> for EngineError {
    fn from(err: lmdb::Error) -> Self {
        use lmdb::Error as E;
        match err {
            E::NotFound => Self::NotFound,
            E::KeyExist => Self::KeyExists,
            E::MapFull | E::PageFull | E::TxnFull | E::CursorFull | E::DbsFull => {
                Self::Full(err.to_string())
            }
            E::ReadersFull | E::TlsFull => Self::TooManyTransactions(err.to_string()),
            E::VersionMismatch | E::Incompatible => Self::VersionMismatch(err.to_string()),
            E::Corrupted | E::PageNotFound | E::Panic => Self::Corrupted(err.to_string()),
            E::BadTxn | E::MapResized => Self::Conflict(err.to_string()),
            E::Invalid | E::BadRslot | E::BadValSize | E::BadDbi => {
                Self::Invalid(err.to_string())
            }
            E::Other(code) => {
                let io_err = io::Error::from_raw_os_error(code);
                if io_err.kind() == io::ErrorKind::OutOfMemory {
                    Self::OutOfMemory
                } else {
                    Self::Io(io_err)
                }
            }
        }
    }
}
