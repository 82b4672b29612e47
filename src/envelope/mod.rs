//! Integrity envelope: a JSON document carrying a payload together with its
//! SHA-256 digest and an AES-256-GCM signature of that digest.
//!
//! ```text
//! { "version": 1, "timestamp": <ms>, "isBinary": true,
//!   "originalFileName": "backup.snap" | null,
//!   "content": "<base64 or text>", "hash": "<hex>", "signature": "<base64>" }
//! ```
//!
//! Validation recomputes the digest of the stored payload and decrypts the
//! signature; both must equal `hash`.

pub mod content;
pub mod reader;
pub mod signing;
pub mod writer;

use serde::{Deserialize, Serialize};

pub use reader::{extract, validate};
pub use signing::SigningKey;
pub use writer::{wrap, wrap_text};

/// Envelope format version written by this crate.
pub const ENVELOPE_VERSION: i64 = 1;

/// Metadata of a sealed or validated envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeInfo {
    pub version: i64,
    pub timestamp: i64,
    pub is_binary: bool,
    pub original_file_name: Option<String>,
    /// Lower-case hex SHA-256 of the payload bytes.
    pub hash: String,
    /// Payload size in bytes.
    pub payload_len: u64,
}
