//! Resident administration: admission, corrections and archiving.
//!
//! Archived residents vanish from listings and the daily view; their
//! medications, chart rows and audit history stay keyed by the original id.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::FieldKey;
use crate::db::repository;
use crate::error::CareError;
use crate::models::enums::LevelOfCare;
use crate::models::Resident;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewResident {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub level_of_care: LevelOfCare,
}

/// Partial correction; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResidentEdit {
    pub name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub level_of_care: Option<LevelOfCare>,
}

/// Trim, collapse inner whitespace and capitalise each word.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn validate_details(
    conn: &Connection,
    name: &str,
    date_of_birth: NaiveDate,
    today: NaiveDate,
    exclude: Option<&Uuid>,
) -> Result<(), CareError> {
    if name.is_empty() {
        return Err(CareError::Validation("resident name is required".into()));
    }
    if date_of_birth > today {
        return Err(CareError::Validation("date of birth cannot be in the future".into()));
    }
    if repository::resident_name_taken(conn, name, exclude)? {
        return Err(CareError::Validation("a resident with this name already exists".into()));
    }
    Ok(())
}

pub fn add_resident(
    conn: &Connection,
    key: &FieldKey,
    input: &NewResident,
    now: NaiveDateTime,
) -> Result<Resident, CareError> {
    let name = normalize_name(&input.name);
    validate_details(conn, &name, input.date_of_birth, now.date(), None)?;

    let resident = Resident {
        id: Uuid::new_v4(),
        name,
        date_of_birth: input.date_of_birth,
        level_of_care: input.level_of_care,
        created_at: now,
        removed_at: None,
    };
    repository::insert_resident(conn, key, &resident)?;
    tracing::info!(resident_id = %resident.id, "Resident added");
    Ok(resident)
}

pub fn edit_resident(
    conn: &Connection,
    key: &FieldKey,
    id: &Uuid,
    edit: &ResidentEdit,
    now: NaiveDateTime,
) -> Result<Resident, CareError> {
    let mut resident = get_resident(conn, key, id)?;
    if let Some(name) = &edit.name {
        resident.name = normalize_name(name);
    }
    if let Some(dob) = edit.date_of_birth {
        resident.date_of_birth = dob;
    }
    if let Some(level) = edit.level_of_care {
        resident.level_of_care = level;
    }
    validate_details(conn, &resident.name, resident.date_of_birth, now.date(), Some(id))?;

    repository::update_resident(conn, key, &resident)?;
    tracing::info!(resident_id = %id, "Resident updated");
    Ok(resident)
}

/// Archive a resident. History stays in place.
pub fn remove_resident(conn: &Connection, id: &Uuid, now: NaiveDateTime) -> Result<(), CareError> {
    if !repository::archive_resident(conn, id, now)? {
        return Err(CareError::NotFound(format!("resident {id} not found")));
    }
    tracing::info!(resident_id = %id, "Resident archived");
    Ok(())
}

/// Non-archived resident by id.
pub fn get_resident(conn: &Connection, key: &FieldKey, id: &Uuid) -> Result<Resident, CareError> {
    match repository::get_resident(conn, key, id)? {
        Some(r) if r.removed_at.is_none() => Ok(r),
        _ => Err(CareError::NotFound(format!("resident {id} not found"))),
    }
}

pub fn list_residents(conn: &Connection, key: &FieldKey) -> Result<Vec<Resident>, CareError> {
    Ok(repository::list_residents(conn, key)?)
}

pub fn resident_count(conn: &Connection) -> Result<i64, CareError> {
    Ok(repository::count_residents(conn)?)
}

pub(crate) fn require_active_resident(conn: &Connection, id: &Uuid) -> Result<(), CareError> {
    if repository::resident_is_active(conn, id)? {
        Ok(())
    } else {
        Err(CareError::NotFound(format!("resident {id} not found")))
    }
}

/// Archived residents still have history to read.
pub(crate) fn require_resident(conn: &Connection, id: &Uuid) -> Result<(), CareError> {
    if repository::resident_exists(conn, id)? {
        Ok(())
    } else {
        Err(CareError::NotFound(format!("resident {id} not found")))
    }
}
