//! Load command implementation.
//!
//! Runs `loop_count` write transactions of `batch_count` random records
//! each against the root catalog, then reads every record back in one
//! read-only transaction.

use rand::Rng;
use rewind_core::{Config, Durability, Environment, Sequences};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Map size used for load runs.
const LOAD_MAP_SIZE: usize = 1 << 31;

/// Options for a load run.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Number of write transactions.
    pub loop_count: usize,
    /// Records written per transaction.
    pub batch_count: usize,
    /// Flush every commit instead of syncing once at the end.
    pub enable_rewind: bool,
}

/// Result of a load run.
#[derive(Debug, Serialize)]
pub struct LoadReport {
    /// Records written, duplicates included.
    pub written: usize,
    /// Distinct keys read back.
    pub checked: usize,
    /// Keys whose value did not match.
    pub mismatched: usize,
    /// Durable sequence after the run.
    pub durable_sequence: u64,
    /// Current sequence after the run.
    pub current_sequence: u64,
}

/// Random key in the `hello-<u32>-<u32>` shape, padded to width 10.
fn record_key(rng: &mut impl Rng) -> String {
    format!("hello-{:10}-{:10}", rng.gen::<u32>(), rng.gen::<u32>())
}

/// 1000-byte value identifying the transaction and the record within it.
fn record_value(i: usize, j: usize) -> String {
    format!("{i:0500}{j:0500}")
}

/// Runs the load command.
pub fn run(path: &Path, options: &LoadOptions) -> Result<LoadReport, Box<dyn std::error::Error>> {
    let durability = if options.enable_rewind {
        Durability::Immediate
    } else {
        Durability::Deferred
    };
    let config = Config::new()
        .durability(durability)
        .map_size(LOAD_MAP_SIZE)
        .max_catalogs(1);

    let mut env: Environment = Environment::open_path(path, config)?;
    let root = env.open_catalog(None)?;
    let start = env.sequences()?;
    info!("Loading into {:?} starting at {}", path, start);

    let mut rng = rand::thread_rng();
    let mut keys: HashMap<String, (usize, usize)> = HashMap::new();
    for i in 0..options.loop_count {
        let mut txn = env.begin_write()?;
        for j in 0..options.batch_count {
            let key = record_key(&mut rng);
            txn.put(&root, key.as_bytes(), record_value(i, j).as_bytes())?;
            keys.insert(key, (i, j));
        }
        let seq = txn.commit()?;
        debug!(transaction = i, sequence = seq.as_u64(), "batch committed");
    }
    if !options.enable_rewind {
        env.sync()?;
    }
    let written = options.loop_count * options.batch_count;
    info!("Updated {} entries", written);

    let mut mismatched = 0;
    {
        let txn = env.begin_read()?;
        for (key, &(i, j)) in &keys {
            let value = txn.get(&root, key.as_bytes())?;
            if value != record_value(i, j).as_bytes() {
                warn!(key = %key, "unexpected value");
                mismatched += 1;
            }
        }
    }
    info!("Checked {} entries", keys.len());

    let seqs: Sequences = env.sequences()?;
    env.close()?;

    Ok(LoadReport {
        written,
        checked: keys.len(),
        mismatched,
        durable_sequence: seqs.durable.as_u64(),
        current_sequence: seqs.current.as_u64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn key_and_value_shapes() {
        let mut rng = StdRng::seed_from_u64(7);
        let key = record_key(&mut rng);
        assert_eq!(key.len(), "hello-".len() + 10 + 1 + 10);
        assert!(key.starts_with("hello-"));

        let value = record_value(3, 42);
        assert_eq!(value.len(), 1000);
        assert!(value[..500].ends_with('3'));
        assert!(value.ends_with("42"));
    }

    #[test]
    fn deferred_load_syncs_at_the_end() {
        let temp = tempdir().unwrap();
        let options = LoadOptions {
            loop_count: 5,
            batch_count: 10,
            enable_rewind: false,
        };

        let report = run(temp.path(), &options).unwrap();
        assert_eq!(report.written, 50);
        assert_eq!(report.mismatched, 0);
        assert_eq!(report.current_sequence, 5);
        assert_eq!(report.durable_sequence, 5);
    }

    #[test]
    fn repeated_loads_continue_the_sequence() {
        let temp = tempdir().unwrap();
        let options = LoadOptions {
            loop_count: 2,
            batch_count: 3,
            enable_rewind: true,
        };

        run(temp.path(), &options).unwrap();
        let report = run(temp.path(), &options).unwrap();
        assert_eq!(report.durable_sequence, 4);
    }
}
