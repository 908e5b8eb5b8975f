//! The single cursor of an environment.
//!
//! An environment owns one cursor slot that moves `Empty -> Open -> Empty`.
//! Opening a cursor while the slot is taken fails with
//! [`RewindError::CursorInUse`] instead of waiting.

use crate::error::{RewindError, RewindResult};
use parking_lot::Mutex;
use rewind_engine::{EngineCursor, KeyValue};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Empty,
    Open,
}

/// The cursor slot of one environment.
#[derive(Debug)]
pub(crate) struct CursorSlot {
    state: Mutex<SlotState>,
}

impl CursorSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
        }
    }

    /// Takes the slot, or fails if a cursor is already open.
    pub(crate) fn acquire(&self) -> RewindResult<SlotGuard<'_>> {
        let mut state = self.state.lock();
        match *state {
            SlotState::Empty => {
                *state = SlotState::Open;
                Ok(SlotGuard { slot: self })
            }
            SlotState::Open => Err(RewindError::CursorInUse),
        }
    }
}

/// Returns the slot to `Empty` when dropped.
#[derive(Debug)]
pub(crate) struct SlotGuard<'a> {
    slot: &'a CursorSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.slot.state.lock() = SlotState::Empty;
    }
}

/// An ordered cursor over one catalog.
///
/// Entries come back in ascending key order and borrow from the transaction
/// that opened the cursor. Dropping the cursor, or calling [`Cursor::close`],
/// frees the environment's cursor slot.
pub struct Cursor<'txn> {
    inner: Box<dyn EngineCursor<'txn> + 'txn>,
    _slot: SlotGuard<'txn>,
}

impl<'txn> Cursor<'txn> {
    pub(crate) fn new(inner: Box<dyn EngineCursor<'txn> + 'txn>, slot: SlotGuard<'txn>) -> Self {
        Self { inner, _slot: slot }
    }

    /// Positions at the first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to position the cursor.
    pub fn first(&mut self) -> RewindResult<Option<KeyValue<'txn>>> {
        Ok(self.inner.first()?)
    }

    /// Positions at the first entry whose key is `>= key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to position the cursor.
    pub fn seek(&mut self, key: &[u8]) -> RewindResult<Option<KeyValue<'txn>>> {
        Ok(self.inner.seek(key)?)
    }

    /// Advances to the next entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to advance the cursor.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> RewindResult<Option<KeyValue<'txn>>> {
        Ok(self.inner.next()?)
    }

    /// Closes the cursor and frees the slot.
    pub fn close(self) {}
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_state_machine() {
        let slot = CursorSlot::new();

        let guard = slot.acquire().unwrap();
        assert_eq!(*slot.state.lock(), SlotState::Open);
        assert!(matches!(slot.acquire(), Err(RewindError::CursorInUse)));

        drop(guard);
        assert_eq!(*slot.state.lock(), SlotState::Empty);
        assert!(slot.acquire().is_ok());
    }
}
