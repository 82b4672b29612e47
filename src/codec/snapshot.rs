//! Snapshot encode/decode against a `Datastore`.
//!
//! Layout (before zstd compression):
//! `[i32 version][i64 created_at]` then, per family in
//! `EntityFamily::SNAPSHOT_ORDER` and only if the version carries it,
//! `[i32 count][record]*count`.

use std::collections::BTreeMap;
use std::io::{BufWriter, Read, Write};

use tracing::{debug, info};

use crate::config::{ExportOptions, ImportOptions};
use crate::error::{DecodeError, EncodeError, Result};
use crate::storage::{BatchWriter, Datastore};
use crate::types::{
    now_millis, Employee, EntityFamily, FaceEmbedding, Person, Record, RegistrationBlock,
    SnapshotHeader, TimeEntry, CURRENT_SNAPSHOT_VERSION,
};

use super::reader::{SnapshotReader, SourceReader};
use super::records::BinaryRecord;
use super::writer::SnapshotWriter;

/// Outcome of an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub header: SnapshotHeader,
    /// Records written per family. Families absent from the format version
    /// are not listed.
    pub counts: BTreeMap<EntityFamily, usize>,
}

/// Outcome of a restore.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub header: SnapshotHeader,
    pub counts: BTreeMap<EntityFamily, usize>,
    pub batches: usize,
}

impl RestoreReport {
    pub fn count(&self, family: EntityFamily) -> usize {
        self.counts.get(&family).copied().unwrap_or(0)
    }
}

// ============================================================================
// Encode
// ============================================================================

/// Encode every family of `store` into a zstd-compressed snapshot.
pub fn encode<D: Datastore, W: Write>(
    store: &D,
    out: W,
    opts: &ExportOptions,
) -> Result<ExportReport> {
    let compressor = zstd::stream::write::Encoder::new(out, opts.compression_level)?;
    let mut w = SnapshotWriter::new(BufWriter::new(compressor)).strip_photos(!opts.include_photos);

    let report = write_sections(store, &mut w, opts.format_version)?;

    let compressor = w.into_inner().into_inner().map_err(|e| e.into_error())?;
    compressor.finish()?.flush()?;
    info!(
        version = report.header.version,
        records = report.counts.values().sum::<usize>(),
        "snapshot encoded"
    );
    Ok(report)
}

/// Write the uncompressed snapshot body.
pub fn write_sections<D: Datastore, W: Write>(
    store: &D,
    w: &mut SnapshotWriter<W>,
    version: i32,
) -> Result<ExportReport> {
    if !(1..=CURRENT_SNAPSHOT_VERSION).contains(&version) {
        return Err(EncodeError::UnsupportedVersion(version).into());
    }
    let header = SnapshotHeader {
        version,
        created_at: now_millis(),
    };
    w.i32(header.version)?;
    w.i64(header.created_at)?;

    let mut counts = BTreeMap::new();
    for family in EntityFamily::SNAPSHOT_ORDER {
        if !header.has_section(family) {
            continue;
        }
        let expected = store.count(family)?;
        w.count(family.as_str(), expected)?;

        let mut written = 0usize;
        store.scan(family, &mut |record| {
            written += 1;
            if written > expected {
                return Err(EncodeError::CountMismatch {
                    family,
                    expected,
                    got: written,
                }
                .into());
            }
            encode_record(&record, w)
        })?;
        if written != expected {
            return Err(EncodeError::CountMismatch {
                family,
                expected,
                got: written,
            }
            .into());
        }
        debug!(%family, count = written, "section encoded");
        counts.insert(family, written);
    }

    Ok(ExportReport { header, counts })
}

fn encode_record<W: Write>(record: &Record, w: &mut SnapshotWriter<W>) -> Result<()> {
    match record {
        Record::Employee(v) => v.encode(w),
        Record::TimeEntry(v) => v.encode(w),
        Record::Registration(v) => v.encode(w),
        Record::Person(v) => v.encode(w),
        Record::FaceEmbedding(v) => v.encode(w),
    }
}

// ============================================================================
// Decode
// ============================================================================

/// Decode a zstd-compressed snapshot into `store`.
///
/// The caller decides whether the target tables are cleared first and
/// whether the writes run inside a transaction; this function only streams
/// records into `put_batch`.
pub fn decode<D: Datastore, R: Read>(
    store: &D,
    input: R,
    opts: &ImportOptions,
) -> Result<RestoreReport> {
    let decompressor = zstd::stream::read::Decoder::new(SourceReader::new(input))?;
    let mut r = SnapshotReader::new(decompressor);
    let report = read_sections(store, &mut r, opts)?;
    info!(
        version = report.header.version,
        records = report.counts.values().sum::<usize>(),
        batches = report.batches,
        "snapshot decoded"
    );
    Ok(report)
}

/// Read only the header of a zstd-compressed snapshot.
pub fn read_header<R: Read>(input: R) -> Result<SnapshotHeader> {
    let decompressor = zstd::stream::read::Decoder::new(SourceReader::new(input))?;
    Ok(decode_header(&mut SnapshotReader::new(decompressor))?)
}

fn decode_header<R: Read>(
    r: &mut SnapshotReader<R>,
) -> std::result::Result<SnapshotHeader, DecodeError> {
    r.enter("header");
    let version = r.i32()?;
    if !(1..=CURRENT_SNAPSHOT_VERSION).contains(&version) {
        return Err(DecodeError::UnsupportedVersion {
            found: version,
            max: CURRENT_SNAPSHOT_VERSION,
        });
    }
    Ok(SnapshotHeader {
        version,
        created_at: r.i64()?,
    })
}

/// Read an uncompressed snapshot body, flushing batches into `store`.
pub fn read_sections<D: Datastore, R: Read>(
    store: &D,
    r: &mut SnapshotReader<R>,
    opts: &ImportOptions,
) -> Result<RestoreReport> {
    let header = decode_header(r)?;
    let mut counts = BTreeMap::new();
    let mut batches = 0;

    for family in EntityFamily::SNAPSHOT_ORDER {
        if !header.has_section(family) {
            debug!(%family, version = header.version, "section not present in this version");
            continue;
        }
        r.enter(family.as_str());
        let count = r.i32()?;
        if count < 0 {
            return Err(DecodeError::NegativeCount { family, count }.into());
        }

        let mut writer = BatchWriter::new(store, family, opts);
        for _ in 0..count {
            writer.push(decode_record(family, r)?)?;
        }
        let (written, flushes) = writer.finish()?;
        debug!(%family, count = written, flushes, "section decoded");
        counts.insert(family, written);
        batches += flushes;
    }

    Ok(RestoreReport {
        header,
        counts,
        batches,
    })
}

fn decode_record<R: Read>(
    family: EntityFamily,
    r: &mut SnapshotReader<R>,
) -> std::result::Result<Record, DecodeError> {
    Ok(match family {
        EntityFamily::Employee => Record::Employee(Employee::decode(r)?),
        EntityFamily::TimeEntry => Record::TimeEntry(TimeEntry::decode(r)?),
        EntityFamily::Registration => Record::Registration(RegistrationBlock::decode(r)?),
        EntityFamily::Person => Record::Person(Person::decode(r)?),
        EntityFamily::FaceEmbedding => Record::FaceEmbedding(FaceEmbedding::decode(r)?),
    })
}
