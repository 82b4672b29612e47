//! Validating and extracting sealed envelopes.
//!
//! The envelope is read with the streaming token reader; `content` is hashed
//! chunk by chunk and never held in memory as a whole. Each known field may
//! appear at most once; unknown keys are skipped.

use std::io::{BufRead, Seek, SeekFrom, Write};

use tracing::{debug, info, warn};

use crate::error::{IntegrityError, ParseError, Result};
use crate::ingest::token::{Token, TokenReader};

use super::content::{ContentDigest, ContentSink};
use super::signing::SigningKey;
use super::{EnvelopeInfo, ENVELOPE_VERSION};

/// Check both the payload digest and the signature.
pub fn validate<R: BufRead>(input: R, key: &SigningKey) -> Result<EnvelopeInfo> {
    let fields = scan(input, None)?;
    let info = fields.verify(key)?;
    info!(is_binary = info.is_binary, bytes = info.payload_len, "envelope validated");
    Ok(info)
}

/// Validate, rewind, then decode the payload into `out`.
///
/// If the payload read on the second pass does not hash to the validated
/// digest, the call fails with `ChangedDuringExtract`; whatever was already
/// written to `out` must then be discarded.
pub fn extract<R, W>(mut input: R, mut out: W, key: &SigningKey) -> Result<EnvelopeInfo>
where
    R: BufRead + Seek,
    W: Write,
{
    let info = scan(&mut input, None)?.verify(key)?;

    input.seek(SeekFrom::Start(0))?;
    let sink: &mut dyn Write = &mut out;
    let digest = scan(&mut input, Some((info.is_binary, sink)))?.copied_digest()?;
    if digest.hex != info.hash {
        warn!("envelope payload changed between validation and extraction");
        return Err(IntegrityError::ChangedDuringExtract.into());
    }
    out.flush()?;

    info!(is_binary = info.is_binary, bytes = digest.len, "envelope extracted");
    Ok(info)
}

/// Raw field values gathered in one pass.
#[derive(Default)]
struct EnvelopeFields {
    version: Option<i64>,
    timestamp: Option<i64>,
    is_binary: Option<bool>,
    original_file_name: Option<String>,
    hash: Option<String>,
    signature: Option<String>,
    text: Option<Result<ContentDigest>>,
    binary: Option<Result<ContentDigest>>,
    /// Digest of the bytes written to the output on an extracting pass.
    copied: Option<Result<ContentDigest>>,
}

impl EnvelopeFields {
    /// Digest of the content interpreted according to `isBinary`.
    fn chosen_digest(&mut self) -> Result<ContentDigest> {
        let slot = if self.is_binary.unwrap_or(false) {
            self.binary.take()
        } else {
            self.text.take()
        };
        match slot {
            Some(digest) => digest,
            None if self.text.is_none() && self.binary.is_none() => {
                Err(IntegrityError::MissingField("content").into())
            }
            None => Err(IntegrityError::MalformedField {
                field: "isBinary",
                reason: "value changed after the content field".to_string(),
            }
            .into()),
        }
    }

    fn copied_digest(&mut self) -> Result<ContentDigest> {
        self.copied
            .take()
            .unwrap_or_else(|| Err(IntegrityError::MissingField("content").into()))
    }

    fn verify(mut self, key: &SigningKey) -> Result<EnvelopeInfo> {
        let version = self.version.unwrap_or(ENVELOPE_VERSION);
        if !(1..=ENVELOPE_VERSION).contains(&version) {
            return Err(IntegrityError::UnsupportedVersion(version).into());
        }
        let digest = self.chosen_digest()?;
        let hash = self
            .hash
            .take()
            .ok_or(IntegrityError::MissingField("hash"))?;
        let signature = self
            .signature
            .take()
            .ok_or(IntegrityError::MissingField("signature"))?;

        if digest.hex != hash {
            debug!(computed = %digest.hex, stored = %hash, "digest mismatch");
            return Err(IntegrityError::DigestMismatch.into());
        }
        key.verify(&signature, &hash)?;

        Ok(EnvelopeInfo {
            version,
            timestamp: self.timestamp.unwrap_or(0),
            is_binary: self.is_binary.unwrap_or(false),
            original_file_name: self.original_file_name,
            hash,
            payload_len: digest.len,
        })
    }
}

/// Walk the envelope once. With `copy_to`, the content is also decoded
/// into the writer according to the given binary flag.
fn scan<R: BufRead>(
    input: R,
    mut copy_to: Option<(bool, &mut dyn Write)>,
) -> Result<EnvelopeFields> {
    let mut tokens = TokenReader::new(input);
    match tokens.next_token()? {
        Token::BeginObject => {}
        other => {
            return Err(ParseError::UnexpectedToken {
                offset: tokens.offset(),
                found: other.kind(),
                expected: "envelope object",
            }
            .into())
        }
    }

    let mut fields = EnvelopeFields::default();
    let mut seen: Vec<&'static str> = Vec::new();
    loop {
        let key = match tokens.next_token()? {
            Token::Name(key) => key,
            Token::EndObject => break,
            other => {
                return Err(ParseError::UnexpectedToken {
                    offset: tokens.offset(),
                    found: other.kind(),
                    expected: "object key",
                }
                .into())
            }
        };
        let Some(field) = known_field(&key) else {
            tokens.skip_value()?;
            continue;
        };
        if seen.contains(&field) {
            warn!(field, "repeated envelope field");
            return Err(IntegrityError::MalformedField {
                field,
                reason: "field appears more than once".to_string(),
            }
            .into());
        }
        seen.push(field);

        match field {
            "version" => fields.version = Some(integer(&mut tokens, "version")?),
            "timestamp" => fields.timestamp = Some(integer(&mut tokens, "timestamp")?),
            "isBinary" => match tokens.next_token()? {
                Token::Bool(b) => fields.is_binary = Some(b),
                other => return Err(malformed("isBinary", &other)),
            },
            "originalFileName" => match tokens.next_token()? {
                Token::Str(s) => fields.original_file_name = Some(s),
                Token::Null => fields.original_file_name = None,
                other => return Err(malformed("originalFileName", &other)),
            },
            "hash" => fields.hash = Some(string(&mut tokens, "hash")?),
            "signature" => fields.signature = Some(string(&mut tokens, "signature")?),
            "content" => match copy_to.take() {
                Some((is_binary, out)) => {
                    let mut sink = ContentSink::new(is_binary, Some(out));
                    tokens.stream_string(|chunk| sink.push(chunk))?;
                    fields.copied = Some(sink.finish());
                }
                None => {
                    // Until `isBinary` is known, hash both interpretations.
                    let mut text = (fields.is_binary != Some(true))
                        .then(|| ContentSink::new(false, None));
                    let mut binary = (fields.is_binary != Some(false))
                        .then(|| ContentSink::new(true, None));
                    tokens.stream_string(|chunk| {
                        if let Some(sink) = text.as_mut() {
                            sink.push(chunk);
                        }
                        if let Some(sink) = binary.as_mut() {
                            sink.push(chunk);
                        }
                    })?;
                    fields.text = text.map(ContentSink::finish);
                    fields.binary = binary.map(ContentSink::finish);
                }
            },
            _ => tokens.skip_value()?,
        }
    }
    tokens.next_token()?;
    Ok(fields)
}

/// Envelope fields that are interpreted; every other key is skipped.
fn known_field(key: &str) -> Option<&'static str> {
    [
        "version",
        "timestamp",
        "isBinary",
        "originalFileName",
        "content",
        "hash",
        "signature",
    ]
    .into_iter()
    .find(|field| *field == key)
}

fn integer<R: BufRead>(tokens: &mut TokenReader<R>, field: &'static str) -> Result<i64> {
    match tokens.next_token()? {
        Token::Number(raw) => raw.parse::<i64>().map_err(|e| {
            IntegrityError::MalformedField {
                field,
                reason: e.to_string(),
            }
            .into()
        }),
        other => Err(malformed(field, &other)),
    }
}

fn string<R: BufRead>(tokens: &mut TokenReader<R>, field: &'static str) -> Result<String> {
    match tokens.next_token()? {
        Token::Str(s) => Ok(s),
        other => Err(malformed(field, &other)),
    }
}

fn malformed(field: &'static str, found: &Token) -> crate::error::SnapshotError {
    IntegrityError::MalformedField {
        field,
        reason: format!("unexpected {}", found.kind()),
    }
    .into()
}
