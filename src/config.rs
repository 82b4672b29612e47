//! Per-call options for export, import, ingest and envelope operations.
//!
//! All options deserialize from camelCase JSON with every field optional, so
//! a host can keep them in its own settings file.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{EntityFamily, CURRENT_SNAPSHOT_VERSION};

/// Default number of records held in memory before a batch flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default zstd compression level for snapshot files.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ============================================================================
// Export
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportOptions {
    /// Snapshot format version to write (1 or 2).
    pub format_version: i32,
    /// Keep time entry photos. When false the photo field is written empty.
    pub include_photos: bool,
    /// zstd level for the snapshot stream.
    pub compression_level: i32,
    /// Wrap the snapshot file in an integrity envelope.
    pub seal: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format_version: CURRENT_SNAPSHOT_VERSION,
            include_photos: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            seal: false,
        }
    }
}

// ============================================================================
// Import
// ============================================================================

/// How a restore commits its writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestoreMode {
    /// Clear and repopulate inside one datastore transaction. A failure
    /// leaves the previous contents untouched.
    #[default]
    Atomic,
    /// Clear, then commit each batch as it is flushed. A failure leaves
    /// whatever prefix was already written.
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportOptions {
    /// Records accumulated before each `put_batch`. Values below 1 are
    /// treated as 1.
    pub batch_size: usize,
    /// Pause after every flush so freed buffers can be reclaimed.
    #[serde(with = "millis")]
    pub yield_delay: Duration,
    pub mode: RestoreMode,
    /// Remove existing records of the restored families first.
    pub clear_existing: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            yield_delay: Duration::ZERO,
            mode: RestoreMode::Atomic,
            clear_existing: true,
        }
    }
}

impl ImportOptions {
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

// ============================================================================
// Ingest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngestOptions {
    /// Families decoded and persisted. Every other family is walked and
    /// discarded.
    pub families: BTreeSet<EntityFamily>,
    #[serde(flatten)]
    pub import: ImportOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            families: BTreeSet::from([EntityFamily::TimeEntry]),
            import: ImportOptions::default(),
        }
    }
}

impl IngestOptions {
    pub fn wants(&self, family: EntityFamily) -> bool {
        self.families.contains(&family)
    }
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvelopeOptions {
    /// Size of the chunks read from a payload source while sealing.
    pub chunk_size: usize,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_ingest_time_entries_only() {
        let opts = IngestOptions::default();
        assert!(opts.wants(EntityFamily::TimeEntry));
        assert!(!opts.wants(EntityFamily::Employee));
        assert_eq!(opts.import.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn loads_partial_json() {
        let opts: IngestOptions = serde_json::from_str(
            r#"{ "families": ["timeEntry", "person"], "batchSize": 1, "yieldDelay": 25 }"#,
        )
        .unwrap();
        assert!(opts.wants(EntityFamily::Person));
        assert_eq!(opts.import.batch_size, 1);
        assert_eq!(opts.import.yield_delay, Duration::from_millis(25));
        assert_eq!(opts.import.mode, RestoreMode::Atomic);

        let export: ExportOptions = serde_json::from_str(r#"{ "includePhotos": true }"#).unwrap();
        assert!(export.include_photos);
        assert_eq!(export.format_version, CURRENT_SNAPSHOT_VERSION);
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let opts = ImportOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert_eq!(opts.effective_batch_size(), 1);
    }
}
