//! Backup facade: export, restore and ingest against any `Datastore`.
//!
//! The codec and the ingest parser only stream records into `put_batch`.
//! This layer decides which families are cleared first and whether the
//! whole sequence runs inside a datastore transaction (`RestoreMode`).

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::info;

use crate::codec::{self, ExportReport, RestoreReport};
use crate::config::{EnvelopeOptions, ExportOptions, ImportOptions, IngestOptions, RestoreMode};
use crate::envelope::{self, SigningKey};
use crate::error::Result;
use crate::ingest::{self, AdmissionFilter, IngestReport};
use crate::storage::Datastore;
use crate::types::EntityFamily;

// ============================================================================
// Export
// ============================================================================

/// Write a compressed snapshot of `store` to `out`. `opts.seal` is ignored
/// here; sealing needs a second pass and is done by `export_snapshot_file`.
pub fn export_snapshot<D: Datastore, W: Write>(
    store: &D,
    out: W,
    opts: &ExportOptions,
) -> Result<ExportReport> {
    codec::encode(store, out, opts)
}

/// Write a snapshot file, optionally sealed in an integrity envelope.
pub fn export_snapshot_file<D: Datastore>(
    store: &D,
    path: impl AsRef<Path>,
    opts: &ExportOptions,
    key: &SigningKey,
) -> Result<ExportReport> {
    let path = path.as_ref();
    if !opts.seal {
        let mut file = File::create(path)?;
        let report = codec::encode(store, &mut file, opts)?;
        file.sync_all()?;
        info!(path = %path.display(), "snapshot file written");
        return Ok(report);
    }

    // Encode to scratch space first, then seal the finished stream.
    let mut scratch = tempfile::tempfile()?;
    let report = codec::encode(store, &mut scratch, opts)?;
    scratch.seek(SeekFrom::Start(0))?;

    let mut file = File::create(path)?;
    let name = path.file_name().and_then(|n| n.to_str());
    envelope::wrap(
        BufReader::new(scratch),
        true,
        name,
        &mut file,
        key,
        &EnvelopeOptions::default(),
    )?;
    file.sync_all()?;
    info!(path = %path.display(), "sealed snapshot file written");
    Ok(report)
}

// ============================================================================
// Restore
// ============================================================================

/// Restore a compressed snapshot from `input`. Every family is cleared
/// first when `clear_existing` is set.
pub fn import_snapshot<D: Datastore, R: Read>(
    store: &D,
    input: R,
    opts: &ImportOptions,
) -> Result<RestoreReport> {
    info!(mode = ?opts.mode, "restoring snapshot");
    apply(store, &EntityFamily::SNAPSHOT_ORDER, opts, |s| {
        codec::decode(s, input, opts)
    })
}

/// Restore a snapshot file, sealed or raw. A file whose first non-blank
/// byte is `{` is treated as an envelope and validated before anything is
/// written to the datastore.
pub fn import_snapshot_file<D: Datastore>(
    store: &D,
    path: impl AsRef<Path>,
    opts: &ImportOptions,
    key: &SigningKey,
) -> Result<RestoreReport> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    if !is_envelope(&mut reader)? {
        return import_snapshot(store, reader, opts);
    }

    let mut scratch = tempfile::tempfile()?;
    envelope::extract(reader, BufWriter::new(&mut scratch), key)?;
    scratch.seek(SeekFrom::Start(0))?;
    import_snapshot(store, BufReader::new(scratch), opts)
}

fn is_envelope<R: BufRead>(reader: &mut R) -> Result<bool> {
    let buf = reader.fill_buf()?;
    Ok(buf.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{'))
}

// ============================================================================
// Ingest
// ============================================================================

/// Ingest a JSON backup document. Only the families in `opts.families` are
/// cleared and persisted.
pub fn ingest_document<D: Datastore, R: BufRead>(
    store: &D,
    input: R,
    opts: &IngestOptions,
    filter: &dyn AdmissionFilter,
) -> Result<IngestReport> {
    let families: Vec<EntityFamily> = opts.families.iter().copied().collect();
    apply(store, &families, &opts.import, |s| {
        ingest::ingest(s, input, opts, filter)
    })
}

/// Ingest a zstd-compressed JSON backup document.
pub fn ingest_compressed_document<D: Datastore, R: Read>(
    store: &D,
    input: R,
    opts: &IngestOptions,
    filter: &dyn AdmissionFilter,
) -> Result<IngestReport> {
    let families: Vec<EntityFamily> = opts.families.iter().copied().collect();
    apply(store, &families, &opts.import, |s| {
        ingest::ingest_compressed(s, input, opts, filter)
    })
}

/// Clear `families` (if asked) and run `body`, inside one transaction in
/// atomic mode.
fn apply<D, T, F>(store: &D, families: &[EntityFamily], opts: &ImportOptions, body: F) -> Result<T>
where
    D: Datastore,
    F: FnOnce(&D) -> Result<T>,
{
    let run = |s: &D| {
        if opts.clear_existing {
            for &family in families {
                s.remove_all(family)?;
            }
        }
        body(s)
    };
    match opts.mode {
        RestoreMode::Atomic => store.transaction(run),
        RestoreMode::Incremental => run(store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SnapshotError};
    use crate::ingest::UnsyncedTimeEntries;
    use crate::storage::MemoryStore;
    use crate::testing::{sample_store, RecordingStore};
    use crate::types::{Employee, Record, TimeEntry};

    fn snapshot_of(store: &MemoryStore) -> Vec<u8> {
        let mut bytes = Vec::new();
        export_snapshot(store, &mut bytes, &ExportOptions::default()).unwrap();
        bytes
    }

    fn target_with_old_data() -> RecordingStore {
        let target = RecordingStore::default();
        target
            .inner
            .insert(Employee {
                code: "OLD".into(),
                ..Default::default()
            })
            .unwrap();
        target
    }

    #[test]
    fn restore_replaces_existing_records() {
        let bytes = snapshot_of(&sample_store());
        let target = target_with_old_data();
        import_snapshot(&target, &bytes[..], &ImportOptions::default()).unwrap();
        assert_eq!(target.inner.records(EntityFamily::Employee).len(), 3);
    }

    #[test]
    fn clear_existing_false_appends() {
        let bytes = snapshot_of(&sample_store());
        let target = target_with_old_data();
        let opts = ImportOptions {
            clear_existing: false,
            ..Default::default()
        };
        import_snapshot(&target, &bytes[..], &opts).unwrap();
        assert_eq!(target.inner.records(EntityFamily::Employee).len(), 4);
    }

    #[test]
    fn atomic_restore_failure_keeps_previous_contents() {
        let bytes = snapshot_of(&sample_store());
        let target = target_with_old_data();
        // Batches: employees, time entries, then registrations fails.
        target.fail_batch(2);

        let err = import_snapshot(&target, &bytes[..], &ImportOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        let employees = target.inner.records(EntityFamily::Employee);
        assert_eq!(employees.len(), 1);
        assert!(matches!(&employees[0], Record::Employee(e) if e.code == "OLD"));
        assert_eq!(target.inner.count(EntityFamily::TimeEntry).unwrap(), 0);
    }

    #[test]
    fn incremental_restore_failure_leaves_a_prefix() {
        let bytes = snapshot_of(&sample_store());
        let target = target_with_old_data();
        target.fail_batch(2);

        let opts = ImportOptions {
            mode: RestoreMode::Incremental,
            ..Default::default()
        };
        assert!(import_snapshot(&target, &bytes[..], &opts).is_err());
        // Old data was cleared and the sections before the failure committed.
        assert_eq!(target.inner.count(EntityFamily::Employee).unwrap(), 3);
        assert_eq!(target.inner.count(EntityFamily::TimeEntry).unwrap(), 2);
        assert_eq!(target.inner.count(EntityFamily::Registration).unwrap(), 0);
    }

    #[test]
    fn ingest_clears_only_ingested_families() {
        let target = MemoryStore::new();
        target.insert(Employee::default()).unwrap();
        target
            .insert(TimeEntry {
                timestamp: 1,
                ..Default::default()
            })
            .unwrap();

        let doc = r#"{"data": {"timeEntries": [{"timestamp": 2, "synced": false}]}}"#;
        ingest_document(
            &target,
            doc.as_bytes(),
            &IngestOptions::default(),
            &UnsyncedTimeEntries,
        )
        .unwrap();

        assert_eq!(target.count(EntityFamily::Employee).unwrap(), 1);
        let entries = target.records(EntityFamily::TimeEntry);
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0], Record::TimeEntry(t) if t.timestamp == 2));
    }

    #[test]
    fn failed_ingest_rolls_back() {
        let target = MemoryStore::new();
        target.insert(TimeEntry::default()).unwrap();
        let doc = r#"{"data": {"timeEntries": [{"synced": false}, {"synced": false"#;
        let err = ingest_document(
            &target,
            doc.as_bytes(),
            &IngestOptions::default(),
            &UnsyncedTimeEntries,
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::Parse(_)));
        assert_eq!(
            target.records(EntityFamily::TimeEntry),
            vec![Record::TimeEntry(TimeEntry::default())]
        );
    }

    #[test]
    fn wrongly_shaped_section_keeps_existing_records() {
        let target = MemoryStore::new();
        target.insert(TimeEntry::default()).unwrap();
        let doc = r#"{"data": {"timeEntries": {"oops": [1, 2]}}}"#;
        let err = ingest_document(
            &target,
            doc.as_bytes(),
            &IngestOptions::default(),
            &UnsyncedTimeEntries,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(target.count(EntityFamily::TimeEntry).unwrap(), 1);
    }

    #[test]
    fn envelope_sniffing() {
        assert!(is_envelope(&mut &b"  \n{\"version\":1}"[..]).unwrap());
        assert!(!is_envelope(&mut &[0x28u8, 0xb5, 0x2f, 0xfd][..]).unwrap());
        assert!(!is_envelope(&mut &b""[..]).unwrap());
    }
}
