//! Sequence bookkeeping.

use crate::types::{SequenceNumber, Sequences};
use parking_lot::Mutex;

/// The two sequence counters of one environment.
///
/// Both counters sit behind one lock so a reader never observes an advance
/// of `current` that belongs to a confirmed flush without the matching
/// advance of `durable`.
#[derive(Debug)]
pub(crate) struct SequenceTracker {
    state: Mutex<Sequences>,
}

impl SequenceTracker {
    /// Starts both counters at the recovered sequence.
    pub(crate) fn new(recovered: SequenceNumber) -> Self {
        Self {
            state: Mutex::new(Sequences::recovered(recovered)),
        }
    }

    /// Returns a consistent snapshot of both counters.
    pub(crate) fn snapshot(&self) -> Sequences {
        *self.state.lock()
    }

    /// Returns the sequence the next write commit will receive.
    pub(crate) fn pending(&self) -> SequenceNumber {
        self.state.lock().current.next()
    }

    /// Records a commit of `seq` that is also confirmed flushed.
    pub(crate) fn confirm(&self, seq: SequenceNumber) {
        let mut state = self.state.lock();
        debug_assert!(seq > state.current, "sequence must advance");
        state.current = seq;
        state.durable = seq;
    }

    /// Records a commit of `seq` that has not been flushed yet.
    pub(crate) fn issue(&self, seq: SequenceNumber) {
        let mut state = self.state.lock();
        debug_assert!(seq > state.current, "sequence must advance");
        state.current = seq;
    }

    /// Marks everything up to `seq` durable after a successful flush.
    ///
    /// `seq` must have been read from `current` before the flush started;
    /// commits issued during the flush stay in the gap.
    pub(crate) fn mark_durable(&self, seq: SequenceNumber) -> Sequences {
        let mut state = self.state.lock();
        if seq > state.durable {
            state.durable = seq.min(state.current);
        }
        *state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn starts_at_recovered_value() {
        let tracker = SequenceTracker::new(SequenceNumber::new(7));
        assert_eq!(tracker.snapshot(), Sequences::recovered(SequenceNumber::new(7)));
        assert_eq!(tracker.pending(), SequenceNumber::new(8));
    }

    #[test]
    fn confirm_moves_both_counters() {
        let tracker = SequenceTracker::new(SequenceNumber::ZERO);
        tracker.confirm(SequenceNumber::new(1));
        let seqs = tracker.snapshot();
        assert_eq!(seqs.current, SequenceNumber::new(1));
        assert_eq!(seqs.durable, SequenceNumber::new(1));
    }

    #[test]
    fn issue_opens_a_gap_until_marked_durable() {
        let tracker = SequenceTracker::new(SequenceNumber::ZERO);
        tracker.issue(SequenceNumber::new(1));
        tracker.issue(SequenceNumber::new(2));
        assert_eq!(tracker.snapshot().gap(), 2);

        let target = tracker.snapshot().current;
        tracker.issue(SequenceNumber::new(3));
        let seqs = tracker.mark_durable(target);
        assert_eq!(seqs.durable, SequenceNumber::new(2));
        assert_eq!(seqs.current, SequenceNumber::new(3));
    }

    #[test]
    fn mark_durable_never_moves_backwards() {
        let tracker = SequenceTracker::new(SequenceNumber::new(5));
        let seqs = tracker.mark_durable(SequenceNumber::new(3));
        assert_eq!(seqs.durable, SequenceNumber::new(5));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Confirm,
        Issue,
        Sync,
        StaleSync(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Confirm),
            Just(Op::Issue),
            Just(Op::Sync),
            (0u64..8).prop_map(Op::StaleSync),
        ]
    }

    proptest! {
        #[test]
        fn durable_never_exceeds_current(ops in prop::collection::vec(op_strategy(), 0..64)) {
            let tracker = SequenceTracker::new(SequenceNumber::ZERO);
            let mut last = tracker.snapshot();

            for op in ops {
                match op {
                    Op::Confirm => tracker.confirm(tracker.pending()),
                    Op::Issue => tracker.issue(tracker.pending()),
                    Op::Sync => {
                        tracker.mark_durable(tracker.snapshot().current);
                    }
                    Op::StaleSync(lag) => {
                        let current = tracker.snapshot().current.as_u64();
                        tracker.mark_durable(SequenceNumber::new(current.saturating_sub(lag)));
                    }
                }

                let seqs = tracker.snapshot();
                prop_assert!(seqs.current >= seqs.durable);
                prop_assert!(seqs.current >= last.current);
                prop_assert!(seqs.durable >= last.durable);
                last = seqs;
            }
        }
    }
}
