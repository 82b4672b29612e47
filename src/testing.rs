//! Shared fixtures for unit tests.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{Result, StorageError};
use crate::storage::{Datastore, MemoryStore};
use crate::types::{
    Employee, EntityFamily, FaceEmbedding, Person, Record, RegistrationBlock, TimeEntry,
};

/// A store holding a few records of every family.
pub(crate) fn sample_store() -> MemoryStore {
    let store = MemoryStore::new();
    for (i, name) in ["Ana Souza", "Bruno Lima", "Carla Dias"].iter().enumerate() {
        store
            .insert(Employee {
                code: format!("E{i:03}"),
                name: name.to_string(),
                active: 1,
                registration_number: format!("R-{i}"),
                national_id: format!("000.000.00{i}-00"),
                role: "Operator".into(),
                department: "Plant".into(),
                sub_unit: "North".into(),
                external_source_id: format!("ext-{i}"),
                imported_at: 1_700_000_000_000 + i as i64,
                organization_id: 7,
            })
            .unwrap();
    }
    store
        .insert(TimeEntry {
            employee_id: 1,
            employee_name: "Ana Souza".into(),
            registration_number: "R-0".into(),
            timestamp: 1_700_000_100_000,
            latitude: Some(-23.55),
            longitude: Some(-46.63),
            observation: "entrada".into(),
            photo: "iVBORw0KGgo=".into(),
            synced: true,
            organization_id: 7,
        })
        .unwrap();
    store
        .insert(TimeEntry {
            employee_id: 2,
            employee_name: "Bruno Lima".into(),
            registration_number: "R-1".into(),
            timestamp: 1_700_000_200_000,
            latitude: None,
            longitude: None,
            observation: String::new(),
            photo: String::new(),
            synced: false,
            organization_id: 7,
        })
        .unwrap();
    store
        .insert(RegistrationBlock {
            employee_id: 1,
            national_id: "000.000.000-00".into(),
            registration_numbers: vec!["R-0".into(), "R-0b".into()],
            role_descriptions: Some(vec!["Operator".into(), "Supervisor".into()]),
            active_flags: Some(vec!["1".into(), "0".into()]),
            sector_descriptions: None,
            organization_descriptions: Some(vec!["Plant".into(), "Plant".into()]),
        })
        .unwrap();
    store
        .insert(Person {
            name: "Ana Souza".into(),
            image_count: 3,
            created_at: 1_700_000_000_500,
            employee_id: 1,
            external_id: "p-1".into(),
        })
        .unwrap();
    store
        .insert(FaceEmbedding {
            person_id: 1,
            person_name: "Ana Souza".into(),
            embedding: vec![0.25, -0.5, 1.0, 0.0],
            image_path: Some("faces/1/a.jpg".into()),
        })
        .unwrap();
    store
        .insert(FaceEmbedding {
            person_id: 1,
            person_name: "Ana Souza".into(),
            embedding: vec![0.125; 8],
            image_path: None,
        })
        .unwrap();
    store
}

/// Wraps a `MemoryStore`, recording every batch and optionally misreporting
/// counts or failing a chosen batch.
#[derive(Default)]
pub(crate) struct RecordingStore {
    pub inner: MemoryStore,
    batches: Mutex<Vec<(EntityFamily, usize)>>,
    inflation: Mutex<HashMap<EntityFamily, usize>>,
    fail_at: Mutex<Option<usize>>,
}

impl RecordingStore {
    pub fn batch_sizes(&self, family: EntityFamily) -> Vec<usize> {
        self.batches
            .lock()
            .iter()
            .filter(|(f, _)| *f == family)
            .map(|(_, n)| *n)
            .collect()
    }

    /// Make `count(family)` report `extra` more records than exist.
    pub fn inflate_count(&self, family: EntityFamily, extra: usize) {
        self.inflation.lock().insert(family, extra);
    }

    /// Fail the `n`th `put_batch` call (zero-based) across all families.
    pub fn fail_batch(&self, n: usize) {
        *self.fail_at.lock() = Some(n);
    }
}

impl Datastore for RecordingStore {
    fn count(&self, family: EntityFamily) -> Result<usize> {
        let extra = self.inflation.lock().get(&family).copied().unwrap_or(0);
        Ok(self.inner.count(family)? + extra)
    }

    fn scan(
        &self,
        family: EntityFamily,
        visit: &mut dyn FnMut(Record) -> Result<()>,
    ) -> Result<()> {
        self.inner.scan(family, visit)
    }

    fn put_batch(&self, family: EntityFamily, records: &[Record]) -> Result<()> {
        let index = self.batches.lock().len();
        if *self.fail_at.lock() == Some(index) {
            return Err(StorageError::Backend(format!("batch {index} refused")).into());
        }
        self.inner.put_batch(family, records)?;
        self.batches.lock().push((family, records.len()));
        Ok(())
    }

    fn remove_all(&self, family: EntityFamily) -> Result<()> {
        self.inner.remove_all(family)
    }

    fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.inner.transaction(|_| f(self))
    }
}
