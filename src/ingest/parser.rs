//! Streaming ingest of a JSON backup document.
//!
//! ```text
//! { "timestamp": ..., "version": ...,
//!   "data": { "employees": [...], "registrations": [...],
//!             "timeEntries": [...], "persons": [...], "faceEmbeddings": [...] } }
//! ```
//!
//! Every array element is consumed. Elements of wanted families are decoded,
//! filtered and written in batches; everything else is walked and dropped.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::IngestOptions;
use crate::error::{ParseError, Result};
use crate::storage::{BatchWriter, Datastore};
use crate::types::{EntityFamily, Record};

use super::families::decode_record;
use super::fields::FieldReader;
use super::filter::AdmissionFilter;
use super::token::{Token, TokenReader};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FamilyTally {
    /// Decoded, admitted and written.
    pub accepted: usize,
    /// Skipped, rejected by the filter, or not an object.
    pub discarded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub families: BTreeMap<EntityFamily, FamilyTally>,
    pub coercion_fallbacks: usize,
    pub batches: usize,
    pub timestamp: Option<i64>,
    pub version: Option<i64>,
}

impl IngestReport {
    pub fn accepted(&self, family: EntityFamily) -> usize {
        self.families.get(&family).map_or(0, |t| t.accepted)
    }

    pub fn discarded(&self, family: EntityFamily) -> usize {
        self.families.get(&family).map_or(0, |t| t.discarded)
    }

    pub fn total_accepted(&self) -> usize {
        self.families.values().map(|t| t.accepted).sum()
    }
}

/// Ingest a plain JSON document.
///
/// Records go straight to `put_batch`; clearing and transactions are up to
/// the caller.
pub fn ingest<D: Datastore, R: BufRead>(
    store: &D,
    input: R,
    opts: &IngestOptions,
    filter: &dyn AdmissionFilter,
) -> Result<IngestReport> {
    let mut tokens = TokenReader::new(input);
    let mut fields = FieldReader::new(&mut tokens);
    let mut run = IngestRun {
        store,
        opts,
        filter,
        report: IngestReport::default(),
    };
    run.document(&mut fields)?;
    run.report.coercion_fallbacks = fields.fallbacks();

    let report = run.report;
    info!(
        accepted = report.total_accepted(),
        batches = report.batches,
        fallbacks = report.coercion_fallbacks,
        "ingest finished"
    );
    Ok(report)
}

/// Ingest a zstd-compressed JSON document.
pub fn ingest_compressed<D: Datastore, R: Read>(
    store: &D,
    input: R,
    opts: &IngestOptions,
    filter: &dyn AdmissionFilter,
) -> Result<IngestReport> {
    let decompressor = zstd::stream::read::Decoder::new(input)?;
    ingest(store, BufReader::new(decompressor), opts, filter)
}

struct IngestRun<'a, D> {
    store: &'a D,
    opts: &'a IngestOptions,
    filter: &'a dyn AdmissionFilter,
    report: IngestReport,
}

impl<'a, D: Datastore> IngestRun<'a, D> {
    fn document<R: BufRead>(&mut self, f: &mut FieldReader<'_, R>) -> Result<()> {
        match f.tokens().next_token()? {
            Token::BeginObject => {}
            other => {
                return Err(ParseError::UnexpectedToken {
                    offset: f.tokens().offset(),
                    found: other.kind(),
                    expected: "document object",
                }
                .into())
            }
        }
        while let Some(key) = f.next_key()? {
            match key.as_str() {
                "timestamp" => self.report.timestamp = Some(f.i64(&key)?),
                "version" => self.report.version = Some(f.i64(&key)?),
                "data" => self.data(f)?,
                _ => f.skip()?,
            }
        }
        // Anything but whitespace after the closing brace is an error here.
        f.tokens().next_token()?;
        Ok(())
    }

    fn data<R: BufRead>(&mut self, f: &mut FieldReader<'_, R>) -> Result<()> {
        if !self.open(f, Token::BeginObject, "data")? {
            return Ok(());
        }
        while let Some(key) = f.next_key()? {
            match EntityFamily::from_document_key(&key) {
                Some(family) => self.family(family, f)?,
                None => {
                    debug!(key, "skipping unknown data section");
                    f.skip()?;
                }
            }
        }
        Ok(())
    }

    fn family<R: BufRead>(
        &mut self,
        family: EntityFamily,
        f: &mut FieldReader<'_, R>,
    ) -> Result<()> {
        if !self.open(f, Token::BeginArray, family.document_key())? {
            return Ok(());
        }

        let wanted = self.opts.wants(family);
        let mut writer = wanted.then(|| BatchWriter::new(self.store, family, &self.opts.import));
        let mut tally = FamilyTally::default();

        loop {
            let token = f.tokens().peek()?;
            if matches!(token, Token::EndArray) {
                f.tokens().next_token()?;
                break;
            }
            let is_object = matches!(token, Token::BeginObject);
            let Some(writer) = writer.as_mut().filter(|_| is_object) else {
                if wanted {
                    warn!(%family, "non-object element in family section, skipping");
                }
                f.skip()?;
                tally.discarded += 1;
                continue;
            };

            f.tokens().next_token()?;
            let record = decode_record(family, f)?;
            if let Record::Registration(block) = &record {
                if let Some((list, expected, got)) = block.ragged_list() {
                    warn!(list, expected, got, "registration block with ragged lists, skipping");
                    tally.discarded += 1;
                    continue;
                }
            }
            if self.filter.admit(&record) {
                writer.push(record)?;
                tally.accepted += 1;
            } else {
                tally.discarded += 1;
            }
        }

        if let Some(writer) = writer {
            let (_, flushes) = writer.finish()?;
            self.report.batches += flushes;
        }
        debug!(
            %family,
            accepted = tally.accepted,
            discarded = tally.discarded,
            "family section consumed"
        );
        let total = self.report.families.entry(family).or_default();
        total.accepted += tally.accepted;
        total.discarded += tally.discarded;
        Ok(())
    }

    /// Consume the opening token of a section. `null` means the section is
    /// absent; any other shape is a structural error.
    fn open<R: BufRead>(
        &self,
        f: &mut FieldReader<'_, R>,
        expected: Token,
        section: &str,
    ) -> Result<bool> {
        let token = f.tokens().next_token()?;
        if token == expected {
            return Ok(true);
        }
        if token == Token::Null {
            debug!(section, "section is null, treating as absent");
            return Ok(false);
        }
        warn!(section, found = token.kind(), "unexpected section shape");
        Err(ParseError::UnexpectedToken {
            offset: f.tokens().offset(),
            found: token.kind(),
            expected: match expected {
                Token::BeginObject => "'{' or null",
                _ => "'[' or null",
            },
        }
        .into())
    }
}
