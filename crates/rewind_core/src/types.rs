//! Core type definitions for Rewind.

use std::fmt;

/// Sequence number of a committed write transaction.
///
/// Sequence numbers are assigned in commit order starting at 1; 0 means
/// "nothing committed yet". Callers may store them alongside their own
/// records to decide, after a restart, which records were durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence of an environment nothing was ever committed to.
    pub const ZERO: Self = Self(0);

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Encodes the sequence as 8 big-endian bytes, which sort in sequence order.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decodes a sequence written by [`SequenceNumber::to_bytes`].
    ///
    /// Returns `None` unless `bytes` is exactly 8 bytes long.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(raw)))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// A consistent view of an environment's two sequence counters.
///
/// `current >= durable` always holds. Commits in `(durable, current]` have
/// been issued but not confirmed on stable storage; those are what a rewind
/// discards after an unclean restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sequences {
    /// Highest sequence confirmed flushed to stable storage.
    pub durable: SequenceNumber,
    /// Sequence of the most recently committed write transaction.
    pub current: SequenceNumber,
}

impl Sequences {
    /// Both counters at `seq`, as after opening or a clean shutdown.
    #[must_use]
    pub const fn recovered(seq: SequenceNumber) -> Self {
        Self {
            durable: seq,
            current: seq,
        }
    }

    /// Number of commits issued but not yet durable.
    #[must_use]
    pub const fn gap(&self) -> u64 {
        self.current.0 - self.durable.0
    }

    /// Returns true if a record stamped with `seq` is known to be durable.
    #[must_use]
    pub fn is_durable(&self, seq: SequenceNumber) -> bool {
        seq <= self.durable
    }
}

impl fmt::Display for Sequences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "durable={} current={}", self.durable, self.current)
    }
}

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Snapshot reads only.
    ReadOnly,
    /// Reads and writes; one at a time per environment.
    ReadWrite,
}
