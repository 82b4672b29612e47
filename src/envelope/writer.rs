//! Writing sealed envelopes.
//!
//! Fields are written in a fixed order: `version`, `timestamp`, `isBinary`,
//! `originalFileName`, `content`, `hash`, `signature`. The payload is read in
//! chunks and hashed in the same pass. Binary chunks are base64 encoded
//! straight into the output; text chunks are UTF-8 checked and JSON escaped.

use std::io::{BufWriter, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::write::EncoderWriter;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::EnvelopeOptions;
use crate::error::Result;
use crate::types::now_millis;

use super::signing::SigningKey;
use super::{EnvelopeInfo, ENVELOPE_VERSION};

/// Seal the bytes read from `source` into an envelope written to `out`.
///
/// With `is_binary` the payload is stored base64 encoded. Otherwise it must
/// be UTF-8 text and is stored as a JSON string.
pub fn wrap<R: Read, W: Write>(
    mut source: R,
    is_binary: bool,
    original_name: Option<&str>,
    out: W,
    key: &SigningKey,
    opts: &EnvelopeOptions,
) -> Result<EnvelopeInfo> {
    let mut out = BufWriter::new(out);
    let timestamp = now_millis();

    write!(
        out,
        "{{\"version\":{ENVELOPE_VERSION},\"timestamp\":{timestamp},\"isBinary\":{is_binary},\"originalFileName\":"
    )?;
    serde_json::to_writer(&mut out, &original_name).map_err(std::io::Error::from)?;
    out.write_all(b",\"content\":")?;

    let (hasher, len) = if is_binary {
        write_binary_content(&mut source, &mut out, opts.chunk_size.max(1))?
    } else {
        write_text_content(&mut source, &mut out, opts.chunk_size.max(1))?
    };
    let hash = hex::encode(hasher.finalize());
    let signature = key.sign(&hash)?;

    write!(out, ",\"hash\":\"{hash}\",\"signature\":\"{signature}\"}}")?;
    out.flush()?;

    info!(is_binary, bytes = len, "envelope sealed");
    Ok(EnvelopeInfo {
        version: ENVELOPE_VERSION,
        timestamp,
        is_binary,
        original_file_name: original_name.map(str::to_string),
        hash,
        payload_len: len,
    })
}

/// Convenience wrapper for an in-memory text payload.
pub fn wrap_text<W: Write>(
    text: &str,
    original_name: Option<&str>,
    out: W,
    key: &SigningKey,
) -> Result<EnvelopeInfo> {
    wrap(
        text.as_bytes(),
        false,
        original_name,
        out,
        key,
        &EnvelopeOptions::default(),
    )
}

fn write_binary_content<R: Read, W: Write>(
    source: &mut R,
    out: &mut W,
    chunk_size: usize,
) -> Result<(Sha256, u64)> {
    let mut hasher = Sha256::new();
    let mut len = 0u64;
    let mut chunk = vec![0u8; chunk_size];

    out.write_all(b"\"")?;
    {
        let mut encoder = EncoderWriter::new(&mut *out, &STANDARD);
        loop {
            let n = read_chunk(source, &mut chunk)?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
            encoder.write_all(&chunk[..n])?;
            len += n as u64;
        }
        encoder.finish()?;
    }
    out.write_all(b"\"")?;
    Ok((hasher, len))
}

fn write_text_content<R: Read, W: Write>(
    source: &mut R,
    out: &mut W,
    chunk_size: usize,
) -> Result<(Sha256, u64)> {
    let mut hasher = Sha256::new();
    let mut len = 0u64;
    let mut chunk = vec![0u8; chunk_size];
    // Bytes read but not yet written: at most an incomplete UTF-8 sequence
    // between reads.
    let mut pending: Vec<u8> = Vec::new();
    let mut escaped: Vec<u8> = Vec::new();

    out.write_all(b"\"")?;
    loop {
        let n = read_chunk(source, &mut chunk)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&chunk[..n]);
        let valid = match std::str::from_utf8(&pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => return Err(not_utf8().into()),
        };
        let text = std::str::from_utf8(&pending[..valid]).map_err(|_| not_utf8())?;

        hasher.update(text.as_bytes());
        len += valid as u64;
        // Serialize as a JSON string and drop the surrounding quotes.
        escaped.clear();
        serde_json::to_writer(&mut escaped, text).map_err(std::io::Error::from)?;
        out.write_all(&escaped[1..escaped.len() - 1])?;
        pending.drain(..valid);
    }
    if !pending.is_empty() {
        return Err(not_utf8().into());
    }
    out.write_all(b"\"")?;
    Ok((hasher, len))
}

fn read_chunk<R: Read>(source: &mut R, chunk: &mut [u8]) -> std::io::Result<usize> {
    loop {
        match source.read(chunk) {
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

fn not_utf8() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "text envelope payload is not valid UTF-8",
    )
}
