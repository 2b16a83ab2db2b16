//! eMAR storage: scheduled slot values, their revision log, and
//! PRN/controlled administration events.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{parse_date, parse_datetime, parse_uuid, DatabaseError, DATETIME_FORMAT, DATE_FORMAT};
use crate::models::enums::TimeSlot;
use crate::models::{AdministrationEvent, ScheduledEntry, SlotRevision};

// ═══════════════════════════════════════════
// Scheduled slot values
// ═══════════════════════════════════════════

/// Insert or overwrite the value of one (resident, medication, day, slot).
pub fn upsert_chart_value(conn: &Connection, entry: &ScheduledEntry) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO emar_chart (resident_id, medication_id, chart_date, time_slot, administered, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (resident_id, medication_id, chart_date, time_slot)
         DO UPDATE SET administered = excluded.administered, updated_at = excluded.updated_at",
        params![
            entry.resident_id.to_string(),
            entry.medication_id.to_string(),
            entry.date.format(DATE_FORMAT).to_string(),
            entry.time_slot.as_str(),
            entry.administered,
            entry.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_chart_value(
    conn: &Connection,
    resident_id: &Uuid,
    medication_id: &Uuid,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<Option<String>, DatabaseError> {
    let value = conn
        .query_row(
            "SELECT administered FROM emar_chart
             WHERE resident_id = ?1 AND medication_id = ?2 AND chart_date = ?3 AND time_slot = ?4",
            params![
                resident_id.to_string(),
                medication_id.to_string(),
                date.format(DATE_FORMAT).to_string(),
                slot.as_str(),
            ],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Scheduled entries of a resident with `from <= date <= to`, by date then slot.
pub fn get_chart_entries_between(
    conn: &Connection,
    resident_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<ScheduledEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT resident_id, medication_id, chart_date, time_slot, administered, updated_at
         FROM emar_chart
         WHERE resident_id = ?1 AND chart_date BETWEEN ?2 AND ?3
         ORDER BY chart_date, medication_id",
    )?;
    let rows = stmt.query_map(
        params![
            resident_id.to_string(),
            from.format(DATE_FORMAT).to_string(),
            to.format(DATE_FORMAT).to_string(),
        ],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        let (resident_id, medication_id, chart_date, time_slot, administered, updated_at) = row?;
        entries.push(ScheduledEntry {
            resident_id: parse_uuid(&resident_id)?,
            medication_id: parse_uuid(&medication_id)?,
            date: parse_date(&chart_date)?,
            time_slot: TimeSlot::from_str(&time_slot)?,
            administered,
            updated_at: parse_datetime(&updated_at)?,
        });
    }
    entries.sort_by_key(|e| (e.date, e.medication_id, e.time_slot));
    Ok(entries)
}

// ═══════════════════════════════════════════
// Revision log
// ═══════════════════════════════════════════

pub fn insert_chart_revision(
    conn: &Connection,
    resident_id: &Uuid,
    revision: &SlotRevision,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO emar_chart_revisions (resident_id, medication_id, chart_date, time_slot,
         previous_value, new_value, changed_by, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            resident_id.to_string(),
            revision.medication_id.to_string(),
            revision.date.format(DATE_FORMAT).to_string(),
            revision.time_slot.as_str(),
            revision.previous_value,
            revision.new_value,
            revision.changed_by,
            revision.changed_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

/// Every change made to one slot-day, oldest first.
pub fn get_chart_revisions(
    conn: &Connection,
    medication_id: &Uuid,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<Vec<SlotRevision>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT previous_value, new_value, changed_by, changed_at
         FROM emar_chart_revisions
         WHERE medication_id = ?1 AND chart_date = ?2 AND time_slot = ?3
         ORDER BY id",
    )?;
    let rows = stmt.query_map(
        params![
            medication_id.to_string(),
            date.format(DATE_FORMAT).to_string(),
            slot.as_str(),
        ],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    )?;

    let mut revisions = Vec::new();
    for row in rows {
        let (previous_value, new_value, changed_by, changed_at) = row?;
        revisions.push(SlotRevision {
            medication_id: *medication_id,
            date,
            time_slot: slot,
            previous_value,
            new_value,
            changed_by,
            changed_at: parse_datetime(&changed_at)?,
        });
    }
    Ok(revisions)
}

// ═══════════════════════════════════════════
// PRN / controlled administrations
// ═══════════════════════════════════════════

pub fn insert_administration(
    conn: &Connection,
    event: &AdministrationEvent,
    created_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO emar_administrations (id, resident_id, medication_id, administered_at,
         administered_by, notes, remaining_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.id.to_string(),
            event.resident_id.to_string(),
            event.medication_id.to_string(),
            event.administered_at.format(DATETIME_FORMAT).to_string(),
            event.administered_by,
            event.notes,
            event.remaining_count,
            created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

/// Administrations of one medication with `from <= administered_at < until`, oldest first.
pub fn get_administrations_between(
    conn: &Connection,
    medication_id: &Uuid,
    from: NaiveDateTime,
    until: NaiveDateTime,
) -> Result<Vec<AdministrationEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, resident_id, medication_id, administered_at, administered_by, notes, remaining_count
         FROM emar_administrations
         WHERE medication_id = ?1 AND administered_at >= ?2 AND administered_at < ?3
         ORDER BY administered_at, created_at",
    )?;
    let rows = stmt.query_map(
        params![
            medication_id.to_string(),
            from.format(DATETIME_FORMAT).to_string(),
            until.format(DATETIME_FORMAT).to_string(),
        ],
        administration_row_from_rusqlite,
    )?;

    let mut events = Vec::new();
    for row in rows {
        events.push(administration_from_row(row?)?);
    }
    Ok(events)
}

/// Administrations of every medication of a resident within a window, oldest first.
pub fn get_resident_administrations_between(
    conn: &Connection,
    resident_id: &Uuid,
    from: NaiveDateTime,
    until: NaiveDateTime,
) -> Result<Vec<AdministrationEvent>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, resident_id, medication_id, administered_at, administered_by, notes, remaining_count
         FROM emar_administrations
         WHERE resident_id = ?1 AND administered_at >= ?2 AND administered_at < ?3
         ORDER BY administered_at, created_at",
    )?;
    let rows = stmt.query_map(
        params![
            resident_id.to_string(),
            from.format(DATETIME_FORMAT).to_string(),
            until.format(DATETIME_FORMAT).to_string(),
        ],
        administration_row_from_rusqlite,
    )?;

    let mut events = Vec::new();
    for row in rows {
        events.push(administration_from_row(row?)?);
    }
    Ok(events)
}

// Internal row type for mapping
struct AdministrationRow {
    id: String,
    resident_id: String,
    medication_id: String,
    administered_at: String,
    administered_by: String,
    notes: String,
    remaining_count: Option<i64>,
}

fn administration_row_from_rusqlite(
    row: &rusqlite::Row<'_>,
) -> Result<AdministrationRow, rusqlite::Error> {
    Ok(AdministrationRow {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        medication_id: row.get(2)?,
        administered_at: row.get(3)?,
        administered_by: row.get(4)?,
        notes: row.get(5)?,
        remaining_count: row.get(6)?,
    })
}

fn administration_from_row(row: AdministrationRow) -> Result<AdministrationEvent, DatabaseError> {
    Ok(AdministrationEvent {
        id: parse_uuid(&row.id)?,
        resident_id: parse_uuid(&row.resident_id)?,
        medication_id: parse_uuid(&row.medication_id)?,
        administered_at: parse_datetime(&row.administered_at)?,
        administered_by: row.administered_by,
        notes: row.notes,
        remaining_count: row.remaining_count,
    })
}
