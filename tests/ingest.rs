//! Integration tests for JSON document ingest through the facade.

use std::collections::BTreeSet;

use timeclock_snapshot::{
    ingest_compressed_document, ingest_document, AdmitAll, Datastore, EntityFamily, ErrorKind,
    ImportOptions, IngestOptions, MemoryStore, Record, TimeEntry,
};

const CLOCK_DOCUMENT: &str = r#"{
  "timestamp": 1700000000000,
  "version": 3,
  "data": {
    "employees": [
      {"id": 1, "code": "A1", "name": "Ana", "active": 1},
      {"id": 2, "code": "B2", "name": "Bruno", "active": 1},
      {"id": 3, "code": "C3", "name": "Carla", "active": 0}
    ],
    "timeEntries": [
      {"id": 10, "employeeId": 1, "employeeName": "Ana", "timestamp": 1700000000001,
       "latitude": -23.5, "longitude": -46.6, "photo": "", "synced": true},
      {"id": 11, "employeeId": 2, "employeeName": "Bruno", "timestamp": 1700000000002,
       "latitude": "abc", "longitude": -46.6, "photo": "", "synced": false}
    ]
  }
}"#;

fn time_entries(store: &MemoryStore) -> Vec<TimeEntry> {
    store
        .records(EntityFamily::TimeEntry)
        .into_iter()
        .filter_map(|r| match r {
            Record::TimeEntry(t) => Some(t),
            _ => None,
        })
        .collect()
}

#[test]
fn default_ingest_keeps_only_unsynced_time_entries() {
    let store = MemoryStore::new();
    let report = ingest_document(
        &store,
        CLOCK_DOCUMENT.as_bytes(),
        &IngestOptions::default(),
        &timeclock_snapshot::UnsyncedTimeEntries,
    )
    .expect("ingest");

    assert_eq!(store.count(EntityFamily::Employee).unwrap(), 0);
    let entries = time_entries(&store);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].employee_name, "Bruno");
    // Non-numeric latitude is left absent and counted as a fallback.
    assert_eq!(entries[0].latitude, None);
    assert_eq!(entries[0].longitude, Some(-46.6));

    assert_eq!(report.accepted(EntityFamily::TimeEntry), 1);
    assert_eq!(report.discarded(EntityFamily::TimeEntry), 1);
    assert_eq!(report.coercion_fallbacks, 1);
    assert_eq!(report.timestamp, Some(1_700_000_000_000));
    assert_eq!(report.version, Some(3));
}

#[test]
fn requested_families_are_all_persisted() {
    let store = MemoryStore::new();
    let opts = IngestOptions {
        families: BTreeSet::from([EntityFamily::Employee, EntityFamily::TimeEntry]),
        import: ImportOptions {
            batch_size: 2,
            ..Default::default()
        },
    };
    let report = ingest_document(&store, CLOCK_DOCUMENT.as_bytes(), &opts, &AdmitAll)
        .expect("ingest");

    assert_eq!(store.count(EntityFamily::Employee).unwrap(), 3);
    assert_eq!(store.count(EntityFamily::TimeEntry).unwrap(), 2);
    assert_eq!(report.total_accepted(), 5);
    // Employees flush as [2, 1], time entries as [2].
    assert_eq!(report.batches, 3);
}

#[test]
fn compressed_document_ingests_like_plain() {
    let compressed = zstd::encode_all(CLOCK_DOCUMENT.as_bytes(), 3).unwrap();
    let store = MemoryStore::new();
    let report = ingest_compressed_document(
        &store,
        &compressed[..],
        &IngestOptions::default(),
        &timeclock_snapshot::UnsyncedTimeEntries,
    )
    .expect("ingest");
    assert_eq!(report.accepted(EntityFamily::TimeEntry), 1);
    assert_eq!(time_entries(&store).len(), 1);
}

#[test]
fn truncated_document_leaves_store_untouched() {
    let store = MemoryStore::new();
    store
        .insert(TimeEntry {
            employee_name: "existing".into(),
            ..Default::default()
        })
        .unwrap();

    let cut = &CLOCK_DOCUMENT[..CLOCK_DOCUMENT.len() - 20];
    let err = ingest_document(
        &store,
        cut.as_bytes(),
        &IngestOptions::default(),
        &timeclock_snapshot::UnsyncedTimeEntries,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);

    let entries = time_entries(&store);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].employee_name, "existing");
}

#[test]
fn large_photo_strings_are_ingested() {
    let photo = "A".repeat(3 * 1024 * 1024);
    let mut doc = String::from(r#"{"data": {"timeEntries": ["#);
    for i in 0..4 {
        if i > 0 {
            doc.push(',');
        }
        doc.push_str(&format!(
            r#"{{"employeeId": {i}, "photo": "{photo}", "synced": {}}}"#,
            i % 2 == 0
        ));
    }
    doc.push_str("]}}");

    let store = MemoryStore::new();
    let report = ingest_document(
        &store,
        doc.as_bytes(),
        &IngestOptions::default(),
        &timeclock_snapshot::UnsyncedTimeEntries,
    )
    .expect("ingest");
    assert_eq!(report.accepted(EntityFamily::TimeEntry), 2);
    let entries = time_entries(&store);
    assert_eq!(entries[0].employee_id, 1);
    assert_eq!(entries[0].photo.len(), photo.len());
}
