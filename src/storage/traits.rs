//! The datastore seam consumed by the codec, the ingest parser and the
//! backup facade.

use crate::error::Result;
use crate::types::{EntityFamily, Record};

/// Storage interface for one multi-family datastore.
///
/// The datastore owns identifiers: `put_batch` assigns fresh ones and no
/// method exposes them.
///
/// # Threading
/// All methods are synchronous and may block on I/O. Implementations must not
/// be re-entered from inside a `scan` visitor.
pub trait Datastore {
    /// Number of stored records of `family`.
    fn count(&self, family: EntityFamily) -> Result<usize>;

    /// Visit every record of `family` in insertion order. An error returned
    /// by the visitor stops the scan and is propagated.
    fn scan(
        &self,
        family: EntityFamily,
        visit: &mut dyn FnMut(Record) -> Result<()>,
    ) -> Result<()>;

    /// Insert a batch of records. Every record must belong to `family`.
    fn put_batch(&self, family: EntityFamily, records: &[Record]) -> Result<()>;

    /// Remove every record of `family`.
    fn remove_all(&self, family: EntityFamily) -> Result<()>;

    /// Run `f` so that either all of its writes become visible or none do.
    /// Nested transactions are rejected.
    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&Self) -> Result<T>;
}

/// Reject a batch that mixes families.
pub(crate) fn check_batch(family: EntityFamily, records: &[Record]) -> Result<()> {
    if let Some(stray) = records.iter().find(|r| r.family() != family) {
        return Err(crate::error::StorageError::MixedBatch {
            expected: family,
            found: stray.family(),
        }
        .into());
    }
    Ok(())
}
