//! Admission filters applied to each decoded ingest record.

use crate::types::Record;

/// Decides whether a decoded record is persisted.
pub trait AdmissionFilter {
    fn admit(&self, record: &Record) -> bool;
}

/// Admits time entries that have not been synced yet. Records of other
/// families pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsyncedTimeEntries;

impl AdmissionFilter for UnsyncedTimeEntries {
    fn admit(&self, record: &Record) -> bool {
        match record {
            Record::TimeEntry(entry) => !entry.synced,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl AdmissionFilter for AdmitAll {
    fn admit(&self, _record: &Record) -> bool {
        true
    }
}

impl<F> AdmissionFilter for F
where
    F: Fn(&Record) -> bool,
{
    fn admit(&self, record: &Record) -> bool {
        self(record)
    }
}
