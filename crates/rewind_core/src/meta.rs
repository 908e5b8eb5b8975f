//! Persisted sequence metadata.
//!
//! Metadata lives in a reserved catalog of the environment itself, so the
//! sequence of a commit is written by the same engine transaction as its data
//! and becomes durable exactly when the data does.
//!
//! | Key | Value |
//! |-----|-------|
//! | `sequence` | u64 big-endian, sequence of the last committed write |
//! | `format_version` | u32 big-endian, [`FORMAT_VERSION`] |

use crate::error::{RewindError, RewindResult};
use crate::types::SequenceNumber;
use rewind_engine::{EngineRead, EngineWrite, PutFlags};

/// Name of the metadata catalog.
pub(crate) const META_CATALOG: &str = "__rewind_meta";

/// Prefix reserved for internal catalogs.
pub(crate) const RESERVED_PREFIX: &str = "__rewind";

const SEQUENCE_KEY: &[u8] = b"sequence";
const FORMAT_VERSION_KEY: &[u8] = b"format_version";

/// Current metadata format version.
pub const FORMAT_VERSION: u32 = 1;

/// Reads the persisted sequence, or zero if none was ever written.
pub(crate) fn read_sequence<R>(txn: &R, meta: R::Catalog) -> RewindResult<SequenceNumber>
where
    R: EngineRead + ?Sized,
{
    match txn.get(meta, SEQUENCE_KEY)? {
        Some(bytes) => SequenceNumber::from_bytes(bytes).ok_or_else(|| {
            RewindError::corrupted(format!(
                "sequence metadata is {} bytes, expected 8",
                bytes.len()
            ))
        }),
        None => Ok(SequenceNumber::ZERO),
    }
}

/// Stages `seq` as the persisted sequence of `txn`.
pub(crate) fn write_sequence<W: EngineWrite>(
    txn: &mut W,
    meta: W::Catalog,
    seq: SequenceNumber,
) -> RewindResult<()> {
    txn.put(meta, SEQUENCE_KEY, &seq.to_bytes(), PutFlags::empty())?;
    Ok(())
}

/// Reads the stored format version, if any.
pub(crate) fn read_format_version<R>(txn: &R, meta: R::Catalog) -> RewindResult<Option<u32>>
where
    R: EngineRead + ?Sized,
{
    match txn.get(meta, FORMAT_VERSION_KEY)? {
        Some(bytes) => {
            let raw: [u8; 4] = bytes.try_into().map_err(|_| {
                RewindError::corrupted(format!(
                    "format version metadata is {} bytes, expected 4",
                    bytes.len()
                ))
            })?;
            Ok(Some(u32::from_be_bytes(raw)))
        }
        None => Ok(None),
    }
}

/// Stages the current format version.
pub(crate) fn write_format_version<W: EngineWrite>(
    txn: &mut W,
    meta: W::Catalog,
    version: u32,
) -> RewindResult<()> {
    txn.put(meta, FORMAT_VERSION_KEY, &version.to_be_bytes(), PutFlags::empty())?;
    Ok(())
}

/// Fails unless `found` is compatible with this build.
pub(crate) fn check_format_version(found: Option<u32>) -> RewindResult<()> {
    match found {
        None => Ok(()),
        Some(FORMAT_VERSION) => Ok(()),
        Some(other) => Err(RewindError::version_mismatch(format!(
            "environment metadata is format v{other}, expected v{FORMAT_VERSION}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_engine::{InMemoryEngine, KvEngine};

    #[test]
    fn sequence_defaults_to_zero() {
        let engine = InMemoryEngine::new();
        let meta = engine.open_catalog(Some(META_CATALOG), true).unwrap();
        let txn = engine.begin_read().unwrap();
        assert_eq!(read_sequence(&txn, meta).unwrap(), SequenceNumber::ZERO);
        assert_eq!(read_format_version(&txn, meta).unwrap(), None);
    }

    #[test]
    fn sequence_round_trips_through_engine() {
        let engine = InMemoryEngine::new();
        let meta = engine.open_catalog(Some(META_CATALOG), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        write_sequence(&mut txn, meta, SequenceNumber::new(42)).unwrap();
        write_format_version(&mut txn, meta, FORMAT_VERSION).unwrap();
        txn.commit().unwrap();

        let txn = engine.begin_read().unwrap();
        assert_eq!(read_sequence(&txn, meta).unwrap(), SequenceNumber::new(42));
        assert_eq!(read_format_version(&txn, meta).unwrap(), Some(FORMAT_VERSION));
    }

    #[test]
    fn truncated_sequence_is_corruption() {
        let engine = InMemoryEngine::new();
        let meta = engine.open_catalog(Some(META_CATALOG), true).unwrap();

        let mut txn = engine.begin_write().unwrap();
        txn.put(meta, SEQUENCE_KEY, b"abc", PutFlags::empty()).unwrap();
        txn.commit().unwrap();

        let txn = engine.begin_read().unwrap();
        assert!(matches!(
            read_sequence(&txn, meta),
            Err(RewindError::Corrupted { .. })
        ));
    }

    #[test]
    fn format_version_check() {
        assert!(check_format_version(None).is_ok());
        assert!(check_format_version(Some(FORMAT_VERSION)).is_ok());
        assert!(matches!(
            check_format_version(Some(FORMAT_VERSION + 1)),
            Err(RewindError::VersionMismatch { .. })
        ));
    }
}
