use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::crypto::FieldKey;
use crate::db::{parse_date, parse_datetime, parse_uuid, DatabaseError, DATETIME_FORMAT, DATE_FORMAT};
use crate::models::enums::{MedicationForm, MedicationKind, TimeSlot};
use crate::models::{Medication, MedicationSchedule};

const MEDICATION_COLUMNS: &str = "id, resident_id, medication_name, dosage, instructions,
     medication_type, medication_form, count, discontinued_date, created_at";

/// Insert a medication and its time-slot links. Callers wrap this in a transaction.
pub fn insert_medication(
    conn: &Connection,
    key: &FieldKey,
    med: &Medication,
) -> Result<(), DatabaseError> {
    let (form, count) = match &med.schedule {
        MedicationSchedule::Controlled { form, count } => (Some(form.as_str()), Some(*count)),
        _ => (None, None),
    };

    conn.execute(
        "INSERT INTO medications (id, resident_id, medication_name, dosage, instructions,
         medication_type, medication_form, count, discontinued_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            med.id.to_string(),
            med.resident_id.to_string(),
            med.name,
            key.seal_text(&med.dosage)?,
            key.seal_text(&med.instructions)?,
            med.kind().as_str(),
            form,
            count,
            med.discontinued_on.map(|d| d.format(DATE_FORMAT).to_string()),
            med.created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;

    for slot in med.time_slots() {
        conn.execute(
            "INSERT INTO medication_time_slots (medication_id, time_slot) VALUES (?1, ?2)",
            params![med.id.to_string(), slot.as_str()],
        )?;
    }
    Ok(())
}

pub fn get_medication(
    conn: &Connection,
    key: &FieldKey,
    id: &Uuid,
) -> Result<Option<Medication>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {MEDICATION_COLUMNS} FROM medications WHERE id = ?1"),
            params![id.to_string()],
            medication_row_from_rusqlite,
        )
        .optional()?;
    row.map(|r| medication_from_row(conn, key, r)).transpose()
}

pub fn medication_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM medications WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Every medication of a resident, discontinued ones included, ordered by name.
pub fn get_medications_for_resident(
    conn: &Connection,
    key: &FieldKey,
    resident_id: &Uuid,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICATION_COLUMNS} FROM medications
         WHERE resident_id = ?1 ORDER BY medication_name, created_at"
    ))?;
    let rows = stmt.query_map(params![resident_id.to_string()], medication_row_from_rusqlite)?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medication_from_row(conn, key, row?)?);
    }
    Ok(meds)
}

/// Rewrite the free-text header fields (name, dosage, instructions).
pub fn update_medication_details(
    conn: &Connection,
    key: &FieldKey,
    med: &Medication,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET medication_name = ?2, dosage = ?3, instructions = ?4 WHERE id = ?1",
        params![
            med.id.to_string(),
            med.name,
            key.seal_text(&med.dosage)?,
            key.seal_text(&med.instructions)?,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Medication".into(),
            id: med.id.to_string(),
        });
    }
    Ok(())
}

/// Set the discontinuation date unless one is already set. Returns whether the row changed.
pub fn set_medication_discontinued(
    conn: &Connection,
    id: &Uuid,
    date: NaiveDate,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET discontinued_date = ?2
         WHERE id = ?1 AND discontinued_date IS NULL",
        params![id.to_string(), date.format(DATE_FORMAT).to_string()],
    )?;
    Ok(changed == 1)
}

pub fn update_controlled_count(
    conn: &Connection,
    id: &Uuid,
    count: i64,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE medications SET count = ?2 WHERE id = ?1 AND medication_type = 'controlled'",
        params![id.to_string(), count],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Medication".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Delete a medication with its slot links and ledger rows.
/// Callers wrap this in a transaction.
pub fn delete_medication_cascade(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let id = id.to_string();
    conn.execute("DELETE FROM medication_time_slots WHERE medication_id = ?1", params![id])?;
    conn.execute("DELETE FROM emar_chart_revisions WHERE medication_id = ?1", params![id])?;
    conn.execute("DELETE FROM emar_chart WHERE medication_id = ?1", params![id])?;
    conn.execute("DELETE FROM emar_administrations WHERE medication_id = ?1", params![id])?;
    let removed = conn.execute("DELETE FROM medications WHERE id = ?1", params![id])?;
    if removed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Medication".into(),
            id,
        });
    }
    Ok(())
}

fn get_time_slots(conn: &Connection, med_id: &str) -> Result<BTreeSet<TimeSlot>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT time_slot FROM medication_time_slots WHERE medication_id = ?1")?;
    let rows = stmt.query_map(params![med_id], |row| row.get::<_, String>(0))?;

    let mut slots = BTreeSet::new();
    for row in rows {
        slots.insert(TimeSlot::from_str(&row?)?);
    }
    Ok(slots)
}

// Internal row type for mapping
struct MedicationRow {
    id: String,
    resident_id: String,
    name: String,
    dosage: Vec<u8>,
    instructions: Vec<u8>,
    medication_type: String,
    medication_form: Option<String>,
    count: Option<i64>,
    discontinued_date: Option<String>,
    created_at: String,
}

fn medication_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<MedicationRow, rusqlite::Error> {
    Ok(MedicationRow {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        instructions: row.get(4)?,
        medication_type: row.get(5)?,
        medication_form: row.get(6)?,
        count: row.get(7)?,
        discontinued_date: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn medication_from_row(
    conn: &Connection,
    key: &FieldKey,
    row: MedicationRow,
) -> Result<Medication, DatabaseError> {
    let schedule = match MedicationKind::from_str(&row.medication_type)? {
        MedicationKind::Scheduled => MedicationSchedule::Scheduled {
            time_slots: get_time_slots(conn, &row.id)?,
        },
        MedicationKind::Prn => MedicationSchedule::Prn,
        MedicationKind::Controlled => {
            let (Some(form), Some(count)) = (row.medication_form.as_deref(), row.count) else {
                return Err(DatabaseError::ConstraintViolation(format!(
                    "controlled medication {} has no form or count",
                    row.id
                )));
            };
            MedicationSchedule::Controlled {
                form: MedicationForm::from_str(form)?,
                count,
            }
        }
    };

    Ok(Medication {
        id: parse_uuid(&row.id)?,
        resident_id: parse_uuid(&row.resident_id)?,
        name: row.name,
        dosage: key.open_text(&row.dosage)?,
        instructions: key.open_text(&row.instructions)?,
        schedule,
        discontinued_on: row.discontinued_date.as_deref().map(parse_date).transpose()?,
        created_at: parse_datetime(&row.created_at)?,
    })
}
