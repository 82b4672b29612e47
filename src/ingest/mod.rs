//! Streaming ingest of JSON backup documents.
//!
//! The document is never materialized: a pull-based token reader walks it,
//! wanted records are decoded field by field with defensive coercion, and
//! accepted records are written in bounded batches.

pub mod families;
pub mod fields;
pub mod filter;
pub mod parser;
pub mod token;

pub use fields::FieldReader;
pub use filter::{AdmissionFilter, AdmitAll, UnsyncedTimeEntries};
pub use parser::{ingest, ingest_compressed, FamilyTally, IngestReport};
pub use token::{Token, TokenReader, MAX_DEPTH};
