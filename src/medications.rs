//! Medication catalog: per-resident scheduled, PRN and controlled
//! medications, their time slots and discontinuation state.
//!
//! The controlled count is set here once, at insertion. After that only
//! `ledger::dispense_controlled` changes it.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::FieldKey;
use crate::db::{atomically, repository};
use crate::error::CareError;
use crate::models::enums::{MedicationForm, TimeSlot, VolumeUnit};
use crate::models::{Medication, MedicationSchedule};
use crate::residents::{require_active_resident, require_resident};

// ═══════════════════════════════════════════
// Input types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NewMedicationKind {
    Scheduled { time_slots: Vec<TimeSlot> },
    Prn,
    /// `count` is the raw entry. Liquids may give a unit; pills may not.
    Controlled {
        form: MedicationForm,
        count: String,
        unit: Option<VolumeUnit>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedication {
    pub resident_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub instructions: String,
    pub kind: NewMedicationKind,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicationEdit {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub instructions: Option<String>,
}

// ═══════════════════════════════════════════
// Count conversion
// ═══════════════════════════════════════════

/// Parse a controlled count and convert it to whole base units.
/// Pill counts must already be whole; liquid volumes round to the
/// nearest millilitre.
pub fn parse_controlled_count(
    raw: &str,
    form: MedicationForm,
    unit: Option<VolumeUnit>,
) -> Result<i64, CareError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CareError::Validation(format!("count '{}' is not a number", raw.trim())))?;
    if !value.is_finite() || value < 0.0 {
        return Err(CareError::Validation("count must be a non-negative number".into()));
    }

    let factor = match (form, unit) {
        (MedicationForm::Pill, None) if value.fract() != 0.0 => {
            return Err(CareError::Validation("pill counts must be whole numbers".into()))
        }
        (MedicationForm::Pill, None) => 1.0,
        (MedicationForm::Pill, Some(_)) => {
            return Err(CareError::Validation("pill counts take no volume unit".into()))
        }
        (MedicationForm::Liquid, unit) => unit.unwrap_or(VolumeUnit::Millilitre).millilitres(),
    };

    let units = (value * factor).round();
    if units > i64::MAX as f64 {
        return Err(CareError::Validation("count is too large".into()));
    }
    Ok(units as i64)
}

// ═══════════════════════════════════════════
// Catalog operations
// ═══════════════════════════════════════════

pub fn add_medication(
    conn: &Connection,
    key: &FieldKey,
    input: &NewMedication,
    now: NaiveDateTime,
) -> Result<Medication, CareError> {
    require_active_resident(conn, &input.resident_id)?;

    let name = input.name.trim();
    if name.is_empty() {
        return Err(CareError::Validation("medication name is required".into()));
    }
    let instructions = input.instructions.trim();

    let schedule = match &input.kind {
        NewMedicationKind::Scheduled { time_slots } => {
            if time_slots.is_empty() {
                return Err(CareError::Validation(
                    "scheduled medications need at least one time slot".into(),
                ));
            }
            MedicationSchedule::Scheduled { time_slots: time_slots.iter().copied().collect() }
        }
        NewMedicationKind::Prn => {
            require_instructions(instructions)?;
            MedicationSchedule::Prn
        }
        NewMedicationKind::Controlled { form, count, unit } => {
            require_instructions(instructions)?;
            MedicationSchedule::Controlled {
                form: *form,
                count: parse_controlled_count(count, *form, *unit)?,
            }
        }
    };

    let med = Medication {
        id: Uuid::new_v4(),
        resident_id: input.resident_id,
        name: name.to_string(),
        dosage: input.dosage.trim().to_string(),
        instructions: instructions.to_string(),
        schedule,
        discontinued_on: None,
        created_at: now,
    };

    atomically(conn, |conn| Ok::<_, CareError>(repository::insert_medication(conn, key, &med)?))?;

    tracing::info!(
        medication_id = %med.id,
        resident_id = %med.resident_id,
        kind = med.kind().as_str(),
        "Medication added"
    );
    Ok(med)
}

fn require_instructions(instructions: &str) -> Result<(), CareError> {
    if instructions.is_empty() {
        return Err(CareError::Validation(
            "PRN and controlled medications need instructions".into(),
        ));
    }
    Ok(())
}

pub fn edit_medication(
    conn: &Connection,
    key: &FieldKey,
    id: &Uuid,
    edit: &MedicationEdit,
) -> Result<Medication, CareError> {
    let mut med = get_medication(conn, key, id)?;

    if let Some(name) = &edit.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(CareError::Validation("medication name is required".into()));
        }
        med.name = name.to_string();
    }
    if let Some(dosage) = &edit.dosage {
        med.dosage = dosage.trim().to_string();
    }
    if let Some(instructions) = &edit.instructions {
        let instructions = instructions.trim();
        if !matches!(med.schedule, MedicationSchedule::Scheduled { .. }) {
            require_instructions(instructions)?;
        }
        med.instructions = instructions.to_string();
    }

    repository::update_medication_details(conn, key, &med)?;
    tracing::info!(medication_id = %id, "Medication updated");
    Ok(med)
}

/// Set the discontinuation date. Returns false, changing nothing, when
/// the medication was already discontinued.
pub fn discontinue_medication(
    conn: &Connection,
    id: &Uuid,
    date: NaiveDate,
) -> Result<bool, CareError> {
    if !repository::medication_exists(conn, id)? {
        return Err(CareError::NotFound(format!("medication {id} not found")));
    }
    let changed = repository::set_medication_discontinued(conn, id, date)?;
    if changed {
        tracing::info!(medication_id = %id, effective = %date, "Medication discontinued");
    } else {
        tracing::debug!(medication_id = %id, "Medication already discontinued");
    }
    Ok(changed)
}

/// Delete a medication with its time slots and every ledger row. Irreversible.
pub fn remove_medication(conn: &Connection, id: &Uuid) -> Result<(), CareError> {
    atomically(conn, |conn| Ok::<_, CareError>(repository::delete_medication_cascade(conn, id)?))?;
    tracing::warn!(medication_id = %id, "Medication removed with its history");
    Ok(())
}

pub fn get_medication(conn: &Connection, key: &FieldKey, id: &Uuid) -> Result<Medication, CareError> {
    repository::get_medication(conn, key, id)?
        .ok_or_else(|| CareError::NotFound(format!("medication {id} not found")))
}

/// Every medication of a resident, discontinued ones included.
pub fn list_medications(
    conn: &Connection,
    key: &FieldKey,
    resident_id: &Uuid,
) -> Result<Vec<Medication>, CareError> {
    require_resident(conn, resident_id)?;
    Ok(repository::get_medications_for_resident(conn, key, resident_id)?)
}

/// Medications not discontinued on or before `as_of`.
pub fn list_active(
    conn: &Connection,
    key: &FieldKey,
    resident_id: &Uuid,
    as_of: NaiveDate,
) -> Result<Vec<Medication>, CareError> {
    Ok(list_medications(conn, key, resident_id)?
        .into_iter()
        .filter(|m| m.is_active_on(as_of))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::{at, date, seed_resident};
    use crate::db::sqlite::open_memory_database;

    fn new_med(resident_id: Uuid, name: &str, kind: NewMedicationKind) -> NewMedication {
        NewMedication {
            resident_id,
            name: name.into(),
            dosage: "5mg".into(),
            instructions: "As directed".into(),
            kind,
        }
    }

    fn liquid(count: &str, unit: Option<VolumeUnit>) -> NewMedicationKind {
        NewMedicationKind::Controlled { form: MedicationForm::Liquid, count: count.into(), unit }
    }

    #[test]
    fn litres_and_ounces_convert_to_millilitres() {
        assert_eq!(parse_controlled_count("1", MedicationForm::Liquid, Some(VolumeUnit::Litre)).unwrap(), 1000);
        assert_eq!(parse_controlled_count("1", MedicationForm::Liquid, Some(VolumeUnit::FluidOunce)).unwrap(), 30);
        assert_eq!(parse_controlled_count("2.5", MedicationForm::Liquid, None).unwrap(), 3);
        assert_eq!(parse_controlled_count(" 30 ", MedicationForm::Pill, None).unwrap(), 30);
    }

    #[test]
    fn bad_counts_rejected() {
        for raw in ["", "abc", "-1", "NaN", "inf"] {
            assert!(
                matches!(parse_controlled_count(raw, MedicationForm::Pill, None), Err(CareError::Validation(_))),
                "{raw} should be rejected"
            );
        }
        assert!(parse_controlled_count("3", MedicationForm::Pill, Some(VolumeUnit::Litre)).is_err());
    }

    #[test]
    fn fractional_pill_count_rejected() {
        assert!(matches!(
            parse_controlled_count("2.5", MedicationForm::Pill, None),
            Err(CareError::Validation(_))
        ));
        assert_eq!(parse_controlled_count("3.0", MedicationForm::Pill, None).unwrap(), 3);

        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let kind = NewMedicationKind::Controlled {
            form: MedicationForm::Pill,
            count: "2.5".into(),
            unit: None,
        };
        let result = add_medication(&conn, &key, &new_med(r.id, "Oxycodone", kind), at(2024, 3, 1, 9, 0));
        assert!(matches!(result, Err(CareError::Validation(_))));
        assert!(list_medications(&conn, &key, &r.id).unwrap().is_empty());
    }

    #[test]
    fn controlled_liquid_stored_in_millilitres() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let now = at(2024, 3, 1, 9, 0);

        let litre = add_medication(&conn, &key, &new_med(r.id, "Morphine", liquid("1", Some(VolumeUnit::Litre))), now).unwrap();
        let ounce = add_medication(&conn, &key, &new_med(r.id, "Codeine", liquid("1", Some(VolumeUnit::FluidOunce))), now).unwrap();

        assert_eq!(get_medication(&conn, &key, &litre.id).unwrap().remaining_count(), Some(1000));
        assert_eq!(get_medication(&conn, &key, &ounce.id).unwrap().remaining_count(), Some(30));
    }

    #[test]
    fn type_invariants_enforced() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let now = at(2024, 3, 1, 9, 0);

        let no_slots = new_med(r.id, "Aspirin", NewMedicationKind::Scheduled { time_slots: vec![] });
        assert!(matches!(add_medication(&conn, &key, &no_slots, now), Err(CareError::Validation(_))));

        let mut prn = new_med(r.id, "Tylenol", NewMedicationKind::Prn);
        prn.instructions = "  ".into();
        assert!(matches!(add_medication(&conn, &key, &prn, now), Err(CareError::Validation(_))));

        let mut controlled = new_med(r.id, "Oxycodone", liquid("-5", None));
        assert!(matches!(add_medication(&conn, &key, &controlled, now), Err(CareError::Validation(_))));
        controlled.kind = liquid("10", None);
        controlled.instructions = String::new();
        assert!(matches!(add_medication(&conn, &key, &controlled, now), Err(CareError::Validation(_))));

        assert!(list_medications(&conn, &key, &r.id).unwrap().is_empty());
    }

    #[test]
    fn unknown_resident_is_not_found() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let input = new_med(Uuid::new_v4(), "Aspirin", NewMedicationKind::Prn);
        assert!(matches!(add_medication(&conn, &key, &input, at(2024, 3, 1, 9, 0)), Err(CareError::NotFound(_))));
    }

    #[test]
    fn edit_is_partial() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let med = add_medication(&conn, &key, &new_med(r.id, "Tylenol", NewMedicationKind::Prn), at(2024, 3, 1, 9, 0)).unwrap();

        let edit = MedicationEdit { dosage: Some("650mg".into()), ..Default::default() };
        let updated = edit_medication(&conn, &key, &med.id, &edit).unwrap();
        assert_eq!(updated.dosage, "650mg");
        assert_eq!(updated.name, "Tylenol");
        assert_eq!(updated.instructions, "As directed");

        let blank = MedicationEdit { instructions: Some(String::new()), ..Default::default() };
        assert!(matches!(edit_medication(&conn, &key, &med.id, &blank), Err(CareError::Validation(_))));
    }

    #[test]
    fn discontinue_is_silent_second_time_and_filters_active() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let slots = NewMedicationKind::Scheduled { time_slots: vec![TimeSlot::Morning] };
        let med = add_medication(&conn, &key, &new_med(r.id, "Aspirin", slots), at(2024, 3, 1, 9, 0)).unwrap();

        assert!(discontinue_medication(&conn, &med.id, date(2024, 3, 15)).unwrap());
        assert!(!discontinue_medication(&conn, &med.id, date(2024, 3, 20)).unwrap());
        assert_eq!(get_medication(&conn, &key, &med.id).unwrap().discontinued_on, Some(date(2024, 3, 15)));

        assert_eq!(list_active(&conn, &key, &r.id, date(2024, 3, 14)).unwrap().len(), 1);
        assert!(list_active(&conn, &key, &r.id, date(2024, 3, 15)).unwrap().is_empty());
        assert!(matches!(
            discontinue_medication(&conn, &Uuid::new_v4(), date(2024, 3, 15)),
            Err(CareError::NotFound(_))
        ));
    }

    #[test]
    fn remove_is_not_found_second_time() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let med = add_medication(&conn, &key, &new_med(r.id, "Tylenol", NewMedicationKind::Prn), at(2024, 3, 1, 9, 0)).unwrap();

        remove_medication(&conn, &med.id).unwrap();
        assert!(matches!(remove_medication(&conn, &med.id), Err(CareError::NotFound(_))));
    }
}
