//! Field-by-field decoders for each entity family's JSON object form.
//!
//! Keys are the camelCase names used by the entity structs. Unknown keys
//! are skipped and missing keys keep the field default.

use std::io::BufRead;

use crate::error::ParseError;
use crate::types::{
    Employee, EntityFamily, FaceEmbedding, Person, Record, RegistrationBlock, TimeEntry,
};

use super::fields::FieldReader;

/// Decode one object of `family`. The opening brace has been consumed; the
/// closing one is consumed before returning.
pub fn decode_record<R: BufRead>(
    family: EntityFamily,
    f: &mut FieldReader<'_, R>,
) -> Result<Record, ParseError> {
    Ok(match family {
        EntityFamily::Employee => Record::Employee(employee(f)?),
        EntityFamily::TimeEntry => Record::TimeEntry(time_entry(f)?),
        EntityFamily::Registration => Record::Registration(registration(f)?),
        EntityFamily::Person => Record::Person(person(f)?),
        EntityFamily::FaceEmbedding => Record::FaceEmbedding(face_embedding(f)?),
    })
}

fn employee<R: BufRead>(f: &mut FieldReader<'_, R>) -> Result<Employee, ParseError> {
    let mut e = Employee::default();
    while let Some(key) = f.next_key()? {
        match key.as_str() {
            "code" => e.code = f.string(&key)?,
            "name" => e.name = f.string(&key)?,
            "active" => e.active = f.i32(&key)?,
            "registrationNumber" => e.registration_number = f.string(&key)?,
            "nationalId" => e.national_id = f.string(&key)?,
            "role" => e.role = f.string(&key)?,
            "department" => e.department = f.string(&key)?,
            "subUnit" => e.sub_unit = f.string(&key)?,
            "externalSourceId" => e.external_source_id = f.string(&key)?,
            "importedAt" => e.imported_at = f.i64(&key)?,
            "organizationId" => e.organization_id = f.i64(&key)?,
            _ => f.skip()?,
        }
    }
    Ok(e)
}

fn time_entry<R: BufRead>(f: &mut FieldReader<'_, R>) -> Result<TimeEntry, ParseError> {
    let mut t = TimeEntry::default();
    while let Some(key) = f.next_key()? {
        match key.as_str() {
            "employeeId" => t.employee_id = f.i64(&key)?,
            "employeeName" => t.employee_name = f.string(&key)?,
            "registrationNumber" => t.registration_number = f.string(&key)?,
            "timestamp" => t.timestamp = f.i64(&key)?,
            "latitude" => t.latitude = f.opt_f64(&key)?,
            "longitude" => t.longitude = f.opt_f64(&key)?,
            "observation" => t.observation = f.string(&key)?,
            "photo" => t.photo = f.string(&key)?,
            "synced" => t.synced = f.bool(&key)?,
            "organizationId" => t.organization_id = f.i64(&key)?,
            _ => f.skip()?,
        }
    }
    Ok(t)
}

fn registration<R: BufRead>(f: &mut FieldReader<'_, R>) -> Result<RegistrationBlock, ParseError> {
    let mut r = RegistrationBlock::default();
    while let Some(key) = f.next_key()? {
        match key.as_str() {
            "employeeId" => r.employee_id = f.i64(&key)?,
            "nationalId" => r.national_id = f.string(&key)?,
            "registrationNumbers" => r.registration_numbers = f.string_list(&key)?,
            "roleDescriptions" => r.role_descriptions = f.opt_string_list(&key)?,
            "activeFlags" => r.active_flags = f.opt_string_list(&key)?,
            "sectorDescriptions" => r.sector_descriptions = f.opt_string_list(&key)?,
            "organizationDescriptions" => r.organization_descriptions = f.opt_string_list(&key)?,
            _ => f.skip()?,
        }
    }
    Ok(r)
}

fn person<R: BufRead>(f: &mut FieldReader<'_, R>) -> Result<Person, ParseError> {
    let mut p = Person::default();
    while let Some(key) = f.next_key()? {
        match key.as_str() {
            "name" => p.name = f.string(&key)?,
            "imageCount" => p.image_count = f.i32(&key)?,
            "createdAt" => p.created_at = f.i64(&key)?,
            "employeeId" => p.employee_id = f.i64(&key)?,
            "externalId" => p.external_id = f.string(&key)?,
            _ => f.skip()?,
        }
    }
    Ok(p)
}

fn face_embedding<R: BufRead>(f: &mut FieldReader<'_, R>) -> Result<FaceEmbedding, ParseError> {
    let mut e = FaceEmbedding::default();
    while let Some(key) = f.next_key()? {
        match key.as_str() {
            "personId" => e.person_id = f.i64(&key)?,
            "personName" => e.person_name = f.string(&key)?,
            "embedding" => e.embedding = f.f32_list(&key)?,
            "imagePath" => e.image_path = f.opt_string(&key)?,
            _ => f.skip()?,
        }
    }
    Ok(e)
}
