//! Error types for the snapshot codec, the streaming ingest parser, the
//! integrity envelope, and the datastore seam.

use thiserror::Error;

use crate::types::EntityFamily;

// ============================================================================
// DecodeError: binary snapshot reader
// ============================================================================

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("snapshot truncated while reading {context}")]
    Truncated { context: &'static str },

    #[error("unsupported snapshot version {found} (supported: 1..={max})")]
    UnsupportedVersion { found: i32, max: i32 },

    #[error("negative element count {count} in {family} section")]
    NegativeCount { family: EntityFamily, count: i32 },

    #[error("negative {what} length {len}")]
    NegativeLength { what: &'static str, len: i32 },

    #[error("{what} length {len} exceeds limit {max}")]
    LengthOutOfRange {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid boolean byte 0x{0:02x}")]
    InvalidBool(u8),

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("registration block list `{list}` has {got} entries, expected {expected}")]
    RaggedRegistration {
        list: &'static str,
        expected: usize,
        got: usize,
    },

    /// Reported by the decompressor or another layer over the source.
    #[error("I/O error while decoding: {0}")]
    Io(std::io::Error),

    /// The source itself failed. Converted to `SnapshotError::Io`.
    #[error("snapshot source failed: {0}")]
    Source(std::io::Error),
}

// ============================================================================
// EncodeError: binary snapshot writer
// ============================================================================

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unsupported target snapshot version {0}")]
    UnsupportedVersion(i32),

    #[error("string of {len} bytes exceeds the 65535-byte field limit")]
    StringTooLong { len: usize },

    #[error("{what} has {len} elements, more than a 32-bit count can hold")]
    TooManyElements { what: &'static str, len: usize },

    #[error("registration block list `{list}` has {got} entries, expected {expected}")]
    RaggedRegistration {
        list: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("datastore reported {expected} {family} records but yielded {got}")]
    CountMismatch {
        family: EntityFamily,
        expected: usize,
        got: usize,
    },
}

// ============================================================================
// ParseError: streaming JSON token reader
// ============================================================================

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected byte {found:?} at offset {offset}, expected {expected}")]
    UnexpectedByte {
        offset: u64,
        found: char,
        expected: &'static str,
    },

    #[error("unexpected end of document at offset {offset}")]
    UnexpectedEnd { offset: u64 },

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        offset: u64,
        found: &'static str,
        expected: &'static str,
    },

    #[error("malformed number {raw:?} at offset {offset}")]
    InvalidNumber { offset: u64, raw: String },

    #[error("invalid escape sequence at offset {offset}")]
    InvalidEscape { offset: u64 },

    #[error("invalid UTF-8 in string ending at offset {offset}")]
    InvalidUtf8 { offset: u64 },

    #[error("nesting deeper than {max} levels at offset {offset}")]
    TooDeep { offset: u64, max: usize },

    #[error("trailing content after the document at offset {offset}")]
    TrailingContent { offset: u64 },

    #[error("I/O error while parsing: {0}")]
    Io(std::io::Error),
}

// ============================================================================
// IntegrityError: envelope validation
// ============================================================================

#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("payload digest does not match the stored hash")]
    DigestMismatch,

    #[error("signature does not match the stored hash")]
    SignatureMismatch,

    #[error("signature could not be decrypted: {0}")]
    BadSignature(String),

    #[error("envelope is missing the `{0}` field")]
    MissingField(&'static str),

    #[error("envelope field `{field}` is malformed: {reason}")]
    MalformedField {
        field: &'static str,
        reason: String,
    },

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(i64),

    #[error("payload changed between validation and extraction")]
    ChangedDuringExtract,
}

// ============================================================================
// CryptoError: signing primitives
// ============================================================================

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Random number generation failed: {0}")]
    RngFailed(String),
}

// ============================================================================
// StorageError: datastore backends
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    #[error("Serialization error in {family} record: {source}")]
    Serialization {
        family: EntityFamily,
        #[source]
        source: serde_json::Error,
    },

    #[error("batch for {expected} contains a {found} record")]
    MixedBatch {
        expected: EntityFamily,
        found: EntityFamily,
    },

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Backend(String),
}

// ============================================================================
// SnapshotError: crate-wide
// ============================================================================

/// Coarse classification surfaced to callers alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Encode,
    Parse,
    Integrity,
    Storage,
    Crypto,
    Io,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Decode error: {0}")]
    Decode(#[source] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SnapshotError::Decode(_) => ErrorKind::Decode,
            SnapshotError::Encode(_) => ErrorKind::Encode,
            SnapshotError::Parse(_) => ErrorKind::Parse,
            SnapshotError::Integrity(_) => ErrorKind::Integrity,
            SnapshotError::Storage(_) => ErrorKind::Storage,
            SnapshotError::Crypto(_) => ErrorKind::Crypto,
            SnapshotError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<DecodeError> for SnapshotError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Source(e) => SnapshotError::Io(e),
            other => SnapshotError::Decode(other),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SnapshotError {
    fn from(e: rusqlite::Error) -> Self {
        SnapshotError::Storage(StorageError::Sqlite(e))
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
