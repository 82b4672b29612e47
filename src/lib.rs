//! Backup and restore for a time-clock datastore.
//!
//! - [`codec`]: versioned, zstd-compressed binary snapshots streamed to and
//!   from a [`Datastore`] in bounded batches.
//! - [`ingest`]: pull-based ingest of large JSON backup documents with
//!   defensive field coercion and a pluggable admission filter.
//! - [`envelope`]: a JSON integrity envelope (SHA-256 digest plus an
//!   AES-256-GCM signature) around any payload.
//! - [`backup`]: the facade tying them to a datastore, with atomic or
//!   incremental restore.

pub mod backup;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ingest;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

pub use backup::{
    export_snapshot, export_snapshot_file, import_snapshot, import_snapshot_file,
    ingest_compressed_document, ingest_document,
};
pub use codec::{ExportReport, RestoreReport};
pub use config::{EnvelopeOptions, ExportOptions, ImportOptions, IngestOptions, RestoreMode};
pub use envelope::{EnvelopeInfo, SigningKey};
pub use error::{
    CryptoError, DecodeError, EncodeError, ErrorKind, IntegrityError, ParseError, Result,
    SnapshotError, StorageError,
};
pub use ingest::{AdmissionFilter, AdmitAll, IngestReport, UnsyncedTimeEntries};
pub use storage::{Datastore, MemoryStore};
#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
pub use types::{
    Employee, EntityFamily, FaceEmbedding, Person, Record, RegistrationBlock, SnapshotHeader,
    TimeEntry, CURRENT_SNAPSHOT_VERSION,
};
