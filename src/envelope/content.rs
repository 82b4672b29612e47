//! Incremental handling of the `content` field: base64 decoding across chunk
//! boundaries and digest computation over the raw payload bytes.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{IntegrityError, SnapshotError};

/// Decodes standard padded base64 fed in arbitrary pieces. ASCII whitespace
/// is ignored so wrapped encodings are accepted.
#[derive(Default)]
pub struct Base64Decoder {
    pending: Vec<u8>,
    decoded: Vec<u8>,
    padded: bool,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every complete quantum buffered so far.
    pub fn feed(&mut self, text: &str) -> Result<&[u8], String> {
        self.pending
            .extend(text.bytes().filter(|b| !b.is_ascii_whitespace()));
        self.decoded.clear();

        let whole = self.pending.len() / 4 * 4;
        if whole == 0 {
            return Ok(&self.decoded);
        }
        if self.padded {
            return Err("data after base64 padding".to_string());
        }
        STANDARD
            .decode_vec(&self.pending[..whole], &mut self.decoded)
            .map_err(|e| e.to_string())?;
        self.padded = self.pending[whole - 1] == b'=';
        self.pending.drain(..whole);
        Ok(&self.decoded)
    }

    pub fn finish(&self) -> Result<(), String> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "{} base64 characters left over at the end",
                self.pending.len()
            ))
        }
    }
}

/// Result of running the content through a `ContentSink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub hex: String,
    pub len: u64,
}

/// Receives content chunks, hashes the payload they represent and optionally
/// copies the payload to an output. Errors are latched so the sink can be
/// driven from an infallible callback.
pub struct ContentSink<'w> {
    decoder: Option<Base64Decoder>,
    hasher: Sha256,
    out: Option<&'w mut dyn Write>,
    len: u64,
    error: Option<SnapshotError>,
}

impl<'w> ContentSink<'w> {
    pub fn new(is_binary: bool, out: Option<&'w mut dyn Write>) -> Self {
        Self {
            decoder: is_binary.then(Base64Decoder::new),
            hasher: Sha256::new(),
            out,
            len: 0,
            error: None,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        if self.error.is_some() {
            return;
        }
        let bytes = match self.decoder.as_mut() {
            Some(decoder) => match decoder.feed(chunk) {
                Ok(bytes) => bytes,
                Err(reason) => {
                    self.error = Some(malformed(reason));
                    return;
                }
            },
            None => chunk.as_bytes(),
        };
        self.hasher.update(bytes);
        self.len += bytes.len() as u64;
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.write_all(bytes) {
                self.error = Some(e.into());
            }
        }
    }

    pub fn finish(self) -> Result<ContentDigest, SnapshotError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(decoder) = &self.decoder {
            decoder.finish().map_err(malformed)?;
        }
        Ok(ContentDigest {
            hex: hex::encode(self.hasher.finalize()),
            len: self.len,
        })
    }
}

fn malformed(reason: String) -> SnapshotError {
    IntegrityError::MalformedField {
        field: "content",
        reason,
    }
    .into()
}
