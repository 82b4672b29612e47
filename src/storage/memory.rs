//! MemoryStore: a `Datastore` that keeps every family in memory.
//!
//! Transactions stage a full copy of the tables; writes inside the
//! transaction go to the copy, which replaces the live tables on commit and
//! is dropped on rollback.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::error::{Result, StorageError};
use crate::types::{EntityFamily, Record};

use super::traits::{check_batch, Datastore};

type Tables = HashMap<EntityFamily, BTreeMap<i64, Record>>;

/// In-memory datastore. Identifiers are assigned from a monotonically
/// increasing counter and never reused.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Staging copy while a transaction is open.
    staged: Mutex<Option<Tables>>,
    next_id: Mutex<i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records of `family`, in insertion order.
    pub fn records(&self, family: EntityFamily) -> Vec<Record> {
        self.with_tables(|tables| {
            tables
                .get(&family)
                .map(|t| t.values().cloned().collect())
                .unwrap_or_default()
        })
    }

    /// Insert a single record.
    pub fn insert(&self, record: impl Into<Record>) -> Result<()> {
        let record = record.into();
        self.put_batch(record.family(), std::slice::from_ref(&record))
    }

    /// Total records across every family.
    pub fn total(&self) -> usize {
        self.with_tables(|tables| tables.values().map(BTreeMap::len).sum())
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Run `f` against the staging tables if a transaction is open, otherwise
    /// against the live tables.
    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut staged = self.staged.lock();
        if let Some(tables) = staged.as_mut() {
            return f(tables);
        }
        drop(staged);
        f(&mut self.tables.lock())
    }

    fn allocate_ids(&self, n: usize) -> i64 {
        let mut next = self.next_id.lock();
        let first = *next + 1;
        *next += n as i64;
        first
    }
}

impl Datastore for MemoryStore {
    fn count(&self, family: EntityFamily) -> Result<usize> {
        Ok(self.with_tables(|tables| tables.get(&family).map_or(0, BTreeMap::len)))
    }

    fn scan(
        &self,
        family: EntityFamily,
        visit: &mut dyn FnMut(Record) -> Result<()>,
    ) -> Result<()> {
        // Collected so no lock is held while the visitor runs.
        for record in self.records(family) {
            visit(record)?;
        }
        Ok(())
    }

    fn put_batch(&self, family: EntityFamily, records: &[Record]) -> Result<()> {
        check_batch(family, records)?;
        let first_id = self.allocate_ids(records.len());
        self.with_tables(|tables| {
            let table = tables.entry(family).or_default();
            for (offset, record) in records.iter().enumerate() {
                table.insert(first_id + offset as i64, record.clone());
            }
        });
        Ok(())
    }

    fn remove_all(&self, family: EntityFamily) -> Result<()> {
        self.with_tables(|tables| {
            tables.remove(&family);
        });
        Ok(())
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        {
            let mut staged = self.staged.lock();
            if staged.is_some() {
                return Err(StorageError::Transaction {
                    message: "nested transactions are not supported in MemoryStore".to_string(),
                }
                .into());
            }
            *staged = Some(self.tables.lock().clone());
        }

        match f(self) {
            Ok(v) => {
                if let Some(tables) = self.staged.lock().take() {
                    *self.tables.lock() = tables;
                }
                Ok(v)
            }
            Err(e) => {
                *self.staged.lock() = None;
                Err(e)
            }
        }
    }
}
