//! Fixed field layouts of each entity family.
//!
//! Field order is part of the format and must never change within a
//! snapshot version.

use std::io::{Read, Write};

use crate::error::{DecodeError, EncodeError, Result};
use crate::types::{Employee, FaceEmbedding, Person, RegistrationBlock, TimeEntry};

use super::reader::SnapshotReader;
use super::writer::SnapshotWriter;

pub trait BinaryRecord: Sized {
    fn encode<W: Write>(&self, w: &mut SnapshotWriter<W>) -> Result<()>;
    fn decode<R: Read>(r: &mut SnapshotReader<R>) -> std::result::Result<Self, DecodeError>;
}

impl BinaryRecord for Employee {
    fn encode<W: Write>(&self, w: &mut SnapshotWriter<W>) -> Result<()> {
        w.str(&self.code)?;
        w.str(&self.name)?;
        w.i32(self.active)?;
        w.str(&self.registration_number)?;
        w.str(&self.national_id)?;
        w.str(&self.role)?;
        w.str(&self.department)?;
        w.str(&self.sub_unit)?;
        w.str(&self.external_source_id)?;
        w.i64(self.imported_at)?;
        w.i64(self.organization_id)
    }

    fn decode<R: Read>(r: &mut SnapshotReader<R>) -> std::result::Result<Self, DecodeError> {
        Ok(Employee {
            code: r.str()?,
            name: r.str()?,
            active: r.i32()?,
            registration_number: r.str()?,
            national_id: r.str()?,
            role: r.str()?,
            department: r.str()?,
            sub_unit: r.str()?,
            external_source_id: r.str()?,
            imported_at: r.i64()?,
            organization_id: r.i64()?,
        })
    }
}

impl BinaryRecord for TimeEntry {
    fn encode<W: Write>(&self, w: &mut SnapshotWriter<W>) -> Result<()> {
        w.i64(self.employee_id)?;
        w.str(&self.employee_name)?;
        w.str(&self.registration_number)?;
        w.i64(self.timestamp)?;
        w.opt_f64(self.latitude)?;
        w.opt_f64(self.longitude)?;
        w.str(&self.observation)?;
        if w.include_photos() {
            w.str(&self.photo)?;
        } else {
            w.str("")?;
        }
        w.bool(self.synced)?;
        w.i64(self.organization_id)
    }

    fn decode<R: Read>(r: &mut SnapshotReader<R>) -> std::result::Result<Self, DecodeError> {
        Ok(TimeEntry {
            employee_id: r.i64()?,
            employee_name: r.str()?,
            registration_number: r.str()?,
            timestamp: r.i64()?,
            latitude: r.opt_f64()?,
            longitude: r.opt_f64()?,
            observation: r.str()?,
            photo: r.str()?,
            synced: r.bool()?,
            organization_id: r.i64()?,
        })
    }
}

impl BinaryRecord for RegistrationBlock {
    fn encode<W: Write>(&self, w: &mut SnapshotWriter<W>) -> Result<()> {
        if let Some((list, expected, got)) = self.ragged_list() {
            return Err(EncodeError::RaggedRegistration {
                list,
                expected,
                got,
            }
            .into());
        }
        w.i64(self.employee_id)?;
        w.str(&self.national_id)?;
        w.str_list("registrationNumbers", &self.registration_numbers)?;
        for (name, list) in self.optional_lists() {
            w.opt_str_list(name, list)?;
        }
        Ok(())
    }

    fn decode<R: Read>(r: &mut SnapshotReader<R>) -> std::result::Result<Self, DecodeError> {
        let block = RegistrationBlock {
            employee_id: r.i64()?,
            national_id: r.str()?,
            registration_numbers: r.str_list("registrationNumbers")?,
            role_descriptions: r.opt_str_list("roleDescriptions")?,
            active_flags: r.opt_str_list("activeFlags")?,
            sector_descriptions: r.opt_str_list("sectorDescriptions")?,
            organization_descriptions: r.opt_str_list("organizationDescriptions")?,
        };
        if let Some((list, expected, got)) = block.ragged_list() {
            return Err(DecodeError::RaggedRegistration {
                list,
                expected,
                got,
            });
        }
        Ok(block)
    }
}

impl BinaryRecord for Person {
    fn encode<W: Write>(&self, w: &mut SnapshotWriter<W>) -> Result<()> {
        w.str(&self.name)?;
        w.i32(self.image_count)?;
        w.i64(self.created_at)?;
        w.i64(self.employee_id)?;
        w.str(&self.external_id)
    }

    fn decode<R: Read>(r: &mut SnapshotReader<R>) -> std::result::Result<Self, DecodeError> {
        Ok(Person {
            name: r.str()?,
            image_count: r.i32()?,
            created_at: r.i64()?,
            employee_id: r.i64()?,
            external_id: r.str()?,
        })
    }
}

impl BinaryRecord for FaceEmbedding {
    fn encode<W: Write>(&self, w: &mut SnapshotWriter<W>) -> Result<()> {
        w.i64(self.person_id)?;
        w.str(&self.person_name)?;
        w.f32_list("embedding", &self.embedding)?;
        w.opt_str(self.image_path.as_deref())
    }

    fn decode<R: Read>(r: &mut SnapshotReader<R>) -> std::result::Result<Self, DecodeError> {
        Ok(FaceEmbedding {
            person_id: r.i64()?,
            person_name: r.str()?,
            embedding: r.f32_list("embedding")?,
            image_path: r.opt_str()?,
        })
    }
}
