//! Entity model shared by the codec, the ingest parser and the datastores.
//!
//! Entities carry no datastore identifier: identifiers are assigned by the
//! datastore on insert and are never exported.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current binary snapshot format version.
pub const CURRENT_SNAPSHOT_VERSION: i32 = 2;

/// First snapshot version that carries registration, person and embedding
/// sections.
pub const EXTENDED_SECTIONS_VERSION: i32 = 2;

// ============================================================================
// EntityFamily
// ============================================================================

/// One of the five entity families tracked by a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityFamily {
    Employee,
    TimeEntry,
    Registration,
    Person,
    FaceEmbedding,
}

impl EntityFamily {
    /// Families in binary snapshot section order.
    pub const SNAPSHOT_ORDER: [EntityFamily; 5] = [
        EntityFamily::Employee,
        EntityFamily::TimeEntry,
        EntityFamily::Registration,
        EntityFamily::Person,
        EntityFamily::FaceEmbedding,
    ];

    /// Key of this family under `data` in the JSON interchange document.
    pub fn document_key(self) -> &'static str {
        match self {
            EntityFamily::Employee => "employees",
            EntityFamily::TimeEntry => "timeEntries",
            EntityFamily::Registration => "registrations",
            EntityFamily::Person => "persons",
            EntityFamily::FaceEmbedding => "faceEmbeddings",
        }
    }

    pub fn from_document_key(key: &str) -> Option<Self> {
        Self::SNAPSHOT_ORDER
            .into_iter()
            .find(|f| f.document_key() == key)
    }

    /// Snapshot version that introduced this family's section.
    pub fn since_version(self) -> i32 {
        match self {
            EntityFamily::Employee | EntityFamily::TimeEntry => 1,
            EntityFamily::Registration | EntityFamily::Person | EntityFamily::FaceEmbedding => {
                EXTENDED_SECTIONS_VERSION
            }
        }
    }

    /// Stable name used as the storage discriminator.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityFamily::Employee => "employee",
            EntityFamily::TimeEntry => "time_entry",
            EntityFamily::Registration => "registration",
            EntityFamily::Person => "person",
            EntityFamily::FaceEmbedding => "face_embedding",
        }
    }
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityFamily::Employee => "employee",
            EntityFamily::TimeEntry => "time entry",
            EntityFamily::Registration => "registration block",
            EntityFamily::Person => "person",
            EntityFamily::FaceEmbedding => "face embedding",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub code: String,
    pub name: String,
    pub active: i32,
    pub registration_number: String,
    pub national_id: String,
    pub role: String,
    pub department: String,
    pub sub_unit: String,
    pub external_source_id: String,
    /// Milliseconds since the Unix epoch.
    pub imported_at: i64,
    pub organization_id: i64,
}

/// Parallel lists describing an employee's registrations.
///
/// The optional lists are either absent or exactly as long as
/// `registration_numbers`. Absent and empty are distinct values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBlock {
    pub employee_id: i64,
    pub national_id: String,
    pub registration_numbers: Vec<String>,
    pub role_descriptions: Option<Vec<String>>,
    pub active_flags: Option<Vec<String>>,
    pub sector_descriptions: Option<Vec<String>>,
    pub organization_descriptions: Option<Vec<String>>,
}

impl RegistrationBlock {
    /// Optional lists with their field names, in wire order.
    pub fn optional_lists(&self) -> [(&'static str, Option<&Vec<String>>); 4] {
        [
            ("roleDescriptions", self.role_descriptions.as_ref()),
            ("activeFlags", self.active_flags.as_ref()),
            ("sectorDescriptions", self.sector_descriptions.as_ref()),
            (
                "organizationDescriptions",
                self.organization_descriptions.as_ref(),
            ),
        ]
    }

    /// Role descriptions, or an empty slice when the list is absent.
    pub fn roles(&self) -> &[String] {
        self.role_descriptions.as_deref().unwrap_or(&[])
    }

    /// The first optional list whose length disagrees with
    /// `registration_numbers`, as `(name, expected, got)`.
    pub fn ragged_list(&self) -> Option<(&'static str, usize, usize)> {
        let expected = self.registration_numbers.len();
        self.optional_lists()
            .into_iter()
            .find_map(|(name, list)| match list {
                Some(list) if list.len() != expected => Some((name, expected, list.len())),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub employee_id: i64,
    pub employee_name: String,
    pub registration_number: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub observation: String,
    /// Encoded photo; may be emptied on export to save space.
    pub photo: String,
    pub synced: bool,
    pub organization_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub name: String,
    pub image_count: i32,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub employee_id: i64,
    pub external_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceEmbedding {
    pub person_id: i64,
    pub person_name: String,
    pub embedding: Vec<f32>,
    pub image_path: Option<String>,
}

// ============================================================================
// Record
// ============================================================================

/// A single entity of any family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "data", rename_all = "camelCase")]
pub enum Record {
    Employee(Employee),
    TimeEntry(TimeEntry),
    Registration(RegistrationBlock),
    Person(Person),
    FaceEmbedding(FaceEmbedding),
}

impl Record {
    pub fn family(&self) -> EntityFamily {
        match self {
            Record::Employee(_) => EntityFamily::Employee,
            Record::TimeEntry(_) => EntityFamily::TimeEntry,
            Record::Registration(_) => EntityFamily::Registration,
            Record::Person(_) => EntityFamily::Person,
            Record::FaceEmbedding(_) => EntityFamily::FaceEmbedding,
        }
    }
}

impl From<Employee> for Record {
    fn from(v: Employee) -> Self {
        Record::Employee(v)
    }
}

impl From<TimeEntry> for Record {
    fn from(v: TimeEntry) -> Self {
        Record::TimeEntry(v)
    }
}

impl From<RegistrationBlock> for Record {
    fn from(v: RegistrationBlock) -> Self {
        Record::Registration(v)
    }
}

impl From<Person> for Record {
    fn from(v: Person) -> Self {
        Record::Person(v)
    }
}

impl From<FaceEmbedding> for Record {
    fn from(v: FaceEmbedding) -> Self {
        Record::FaceEmbedding(v)
    }
}

// ============================================================================
// SnapshotHeader
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotHeader {
    pub version: i32,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
}

impl SnapshotHeader {
    /// Whether this snapshot carries the section for `family`.
    pub fn has_section(&self, family: EntityFamily) -> bool {
        self.version >= family.since_version()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_keys_round_trip() {
        for family in EntityFamily::SNAPSHOT_ORDER {
            assert_eq!(
                EntityFamily::from_document_key(family.document_key()),
                Some(family)
            );
        }
        assert_eq!(EntityFamily::from_document_key("devices"), None);
    }

    #[test]
    fn v1_header_has_only_base_sections() {
        let header = SnapshotHeader {
            version: 1,
            created_at: 0,
        };
        assert!(header.has_section(EntityFamily::Employee));
        assert!(header.has_section(EntityFamily::TimeEntry));
        assert!(!header.has_section(EntityFamily::Registration));
        assert!(!header.has_section(EntityFamily::Person));
        assert!(!header.has_section(EntityFamily::FaceEmbedding));
    }

    #[test]
    fn ragged_registration_lists_are_detected() {
        let block = RegistrationBlock {
            registration_numbers: vec!["1".into(), "2".into()],
            role_descriptions: Some(vec!["a".into(), "b".into()]),
            sector_descriptions: Some(vec!["x".into()]),
            ..Default::default()
        };
        assert_eq!(block.ragged_list(), Some(("sectorDescriptions", 2, 1)));

        let block = RegistrationBlock {
            registration_numbers: vec!["1".into()],
            active_flags: Some(vec!["1".into()]),
            ..Default::default()
        };
        assert_eq!(block.ragged_list(), None);
        assert!(block.roles().is_empty());
    }

    #[test]
    fn record_serializes_with_family_tag() {
        let record = Record::from(Person {
            name: "Ana".into(),
            image_count: 3,
            ..Default::default()
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["family"], "person");
        assert_eq!(json["data"]["imageCount"], 3);
        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
