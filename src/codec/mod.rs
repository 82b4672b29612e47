//! Versioned binary snapshot codec.
//!
//! A snapshot is a zstd stream of big-endian fields. The writer pulls records
//! from a `Datastore` one family at a time; the reader streams them back into
//! a `Datastore` in bounded batches.

pub mod reader;
pub mod records;
pub mod snapshot;
pub mod writer;

pub use reader::SnapshotReader;
pub use records::BinaryRecord;
pub use snapshot::{
    decode, encode, read_header, read_sections, write_sections, ExportReport, RestoreReport,
};
pub use writer::SnapshotWriter;
