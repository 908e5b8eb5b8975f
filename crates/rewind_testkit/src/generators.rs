//! Property-based test generators using proptest.
//!
//! Provides strategies for random workloads against an environment and a
//! driver that applies them.

use crate::fixtures::MemoryEnvironment;
use proptest::prelude::*;
use rewind_core::{RewindError, RewindResult, SequenceNumber};

/// Strategy for short keys, so workloads overwrite and delete existing keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..4)
}

/// Strategy for values (arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// A single write inside a transaction.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or overwrite a key.
    Put(Vec<u8>, Vec<u8>),
    /// Delete a key.
    Delete(Vec<u8>),
}

/// Strategy for writes, mostly puts.
pub fn write_op_strategy() -> impl Strategy<Value = WriteOp> {
    prop_oneof![
        3 => (key_strategy(), value_strategy()).prop_map(|(k, v)| WriteOp::Put(k, v)),
        1 => key_strategy().prop_map(WriteOp::Delete),
    ]
}

/// One step of a workload.
#[derive(Debug, Clone)]
pub enum Step {
    /// A write transaction that commits or aborts.
    Transaction {
        /// Writes issued in order.
        writes: Vec<WriteOp>,
        /// Whether the transaction commits.
        commit: bool,
    },
    /// Flush pending commits.
    Sync,
    /// Fail the next flushes until switched back.
    FailFlushes(bool),
    /// Lose everything unflushed and restart.
    Crash,
}

/// Strategy for workload steps.
pub fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        6 => (prop::collection::vec(write_op_strategy(), 0..6), prop::bool::weighted(0.8))
            .prop_map(|(writes, commit)| Step::Transaction { writes, commit }),
        2 => Just(Step::Sync),
        1 => any::<bool>().prop_map(Step::FailFlushes),
        1 => Just(Step::Crash),
    ]
}

/// Strategy for a whole workload.
pub fn workload_strategy(max_steps: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step_strategy(), 0..max_steps)
}

/// What a step did to the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step succeeded.
    Applied,
    /// A commit or sync failed with an injected flush failure.
    FlushFailed,
    /// The environment restarted; carries the durable sequence before the crash.
    Recovered(SequenceNumber),
}

/// Applies one step to `fixture`.
///
/// Injected flush failures are reported as [`StepOutcome::FlushFailed`];
/// any other error is returned.
pub fn apply_step(fixture: &mut MemoryEnvironment, step: &Step) -> RewindResult<StepOutcome> {
    match step {
        Step::Transaction { writes, commit } => {
            let root = fixture.env.open_catalog(None)?;
            let mut txn = fixture.env.begin_write()?;
            for op in writes {
                match op {
                    WriteOp::Put(key, value) => txn.put(&root, key, value)?,
                    WriteOp::Delete(key) => {
                        txn.delete(&root, key)?;
                    }
                }
            }
            if !commit {
                txn.abort();
                return Ok(StepOutcome::Applied);
            }
            match txn.commit() {
                Ok(_) => Ok(StepOutcome::Applied),
                Err(RewindError::Io(_)) if flushes_failing(fixture) => {
                    Ok(StepOutcome::FlushFailed)
                }
                Err(e) => Err(e),
            }
        }
        Step::Sync => match fixture.env.sync() {
            Ok(_) => Ok(StepOutcome::Applied),
            Err(RewindError::Io(_)) if flushes_failing(fixture) => {
                Ok(StepOutcome::FlushFailed)
            }
            Err(e) => Err(e),
        },
        Step::FailFlushes(fail) => {
            fixture.faults.set_fail_on_flush(*fail);
            Ok(StepOutcome::Applied)
        }
        Step::Crash => Ok(StepOutcome::Recovered(fixture.crash_and_recover())),
    }
}

fn flushes_failing(fixture: &MemoryEnvironment) -> bool {
    fixture.faults.failed_flush_count() > 0
}
