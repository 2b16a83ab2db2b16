//! Administration ledger.
//!
//! Scheduled medications keep one current value per (resident, medication,
//! day, slot); every change to that value is also appended to a revision
//! log. PRN and controlled administrations are true appends, one row per
//! dose. Controlled counts move only through `dispense_controlled`, which
//! pairs every count change with an administration row in one transaction.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::FieldKey;
use crate::db::{atomically, repository};
use crate::error::CareError;
use crate::models::enums::TimeSlot;
use crate::models::{
    AdministrationEvent, Medication, MedicationSchedule, ScheduledEntry, SlotRevision, YearMonth,
};
use crate::residents::require_resident;

// ═══════════════════════════════════════════
// Input and view types
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRecord {
    pub resident_id: Uuid,
    pub medication_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: TimeSlot,
    /// Usually initials. Empty means not given yet.
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsNeededRecord {
    pub resident_id: Uuid,
    pub medication_id: Uuid,
    pub administered_at: NaiveDateTime,
    pub initials: String,
    pub notes: String,
}

/// Ledger contents for a resident over a day or a month.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerView {
    pub scheduled: Vec<ScheduledEntry>,
    pub administrations: Vec<AdministrationEvent>,
}

/// Current scheduled values for one day, keyed by medication and slot.
pub type DaySlotValues = BTreeMap<(Uuid, TimeSlot), String>;

// ═══════════════════════════════════════════
// Scheduled recording
// ═══════════════════════════════════════════

pub(crate) fn check_scheduled_target(
    med: &Medication,
    resident_id: &Uuid,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<(), CareError> {
    if med.resident_id != *resident_id {
        return Err(CareError::Validation("medication belongs to another resident".into()));
    }
    let MedicationSchedule::Scheduled { time_slots } = &med.schedule else {
        return Err(CareError::Validation("medication is not on a fixed schedule".into()));
    };
    if !time_slots.contains(&slot) {
        return Err(CareError::Validation(format!(
            "medication is not given at {}",
            slot.label()
        )));
    }
    if !med.is_active_on(date) {
        return Err(CareError::Validation("medication is discontinued on that date".into()));
    }
    Ok(())
}

/// Write one slot value and its revision. No validation, no transaction.
pub(crate) fn write_scheduled(
    conn: &Connection,
    record: &ScheduledRecord,
    changed_by: &str,
    now: NaiveDateTime,
) -> Result<bool, CareError> {
    let value = record.value.trim().to_uppercase();
    let previous = repository::get_chart_value(
        conn,
        &record.resident_id,
        &record.medication_id,
        record.date,
        record.time_slot,
    )?;
    if previous.as_deref().unwrap_or("") == value {
        return Ok(false);
    }

    repository::upsert_chart_value(
        conn,
        &ScheduledEntry {
            resident_id: record.resident_id,
            medication_id: record.medication_id,
            date: record.date,
            time_slot: record.time_slot,
            administered: value.clone(),
            updated_at: now,
        },
    )?;
    repository::insert_chart_revision(
        conn,
        &record.resident_id,
        &SlotRevision {
            medication_id: record.medication_id,
            date: record.date,
            time_slot: record.time_slot,
            previous_value: previous,
            new_value: value,
            changed_by: changed_by.to_string(),
            changed_at: now,
        },
    )?;
    Ok(true)
}

/// Set the value of one scheduled slot-day, overwriting any earlier value.
/// Returns whether the stored value changed.
pub fn record_scheduled(
    conn: &Connection,
    key: &FieldKey,
    record: &ScheduledRecord,
    changed_by: &str,
    now: NaiveDateTime,
) -> Result<bool, CareError> {
    let med = load_medication(conn, key, &record.medication_id)?;
    check_scheduled_target(&med, &record.resident_id, record.date, record.time_slot)?;

    let changed = atomically(conn, |conn| write_scheduled(conn, record, changed_by, now))?;

    if changed {
        tracing::debug!(
            medication_id = %record.medication_id,
            slot = record.time_slot.as_str(),
            "Scheduled administration recorded"
        );
    }
    Ok(changed)
}

// ═══════════════════════════════════════════
// PRN / controlled recording
// ═══════════════════════════════════════════

fn check_as_needed(
    med: &Medication,
    record: &AsNeededRecord,
    now: NaiveDateTime,
) -> Result<String, CareError> {
    if med.resident_id != record.resident_id {
        return Err(CareError::Validation("medication belongs to another resident".into()));
    }
    if record.administered_at > now {
        return Err(CareError::Validation("administration time cannot be in the future".into()));
    }
    if !med.is_active_on(record.administered_at.date()) {
        return Err(CareError::Validation("medication is discontinued on that date".into()));
    }
    let initials = record.initials.trim().to_uppercase();
    if initials.is_empty() {
        return Err(CareError::Validation("initials are required".into()));
    }
    Ok(initials)
}

/// Append a PRN or controlled administration. Controlled medications
/// require `administered_count` and go through `dispense_controlled`.
pub fn record_prn_or_controlled(
    conn: &Connection,
    key: &FieldKey,
    record: &AsNeededRecord,
    administered_count: Option<i64>,
    now: NaiveDateTime,
) -> Result<AdministrationEvent, CareError> {
    let med = load_medication(conn, key, &record.medication_id)?;
    match med.schedule {
        MedicationSchedule::Scheduled { .. } => Err(CareError::Validation(
            "scheduled medications are recorded per time slot".into(),
        )),
        MedicationSchedule::Controlled { .. } => {
            let count = administered_count.ok_or_else(|| {
                CareError::Validation("controlled medications need an administered count".into())
            })?;
            dispense_controlled(conn, key, record, count, now)
        }
        MedicationSchedule::Prn => {
            let initials = check_as_needed(&med, record, now)?;
            let event = AdministrationEvent {
                id: Uuid::new_v4(),
                resident_id: record.resident_id,
                medication_id: record.medication_id,
                administered_at: record.administered_at,
                administered_by: initials,
                notes: record.notes.trim().to_string(),
                remaining_count: None,
            };
            repository::insert_administration(conn, &event, now)?;
            tracing::info!(medication_id = %event.medication_id, "PRN administration recorded");
            Ok(event)
        }
    }
}

/// Give `administered_count` units of a controlled medication: append the
/// administration and lower the stored count, atomically.
pub fn dispense_controlled(
    conn: &Connection,
    key: &FieldKey,
    record: &AsNeededRecord,
    administered_count: i64,
    now: NaiveDateTime,
) -> Result<AdministrationEvent, CareError> {
    let (event, remaining) = atomically(conn, |conn| -> Result<_, CareError> {
        let med = load_medication(conn, key, &record.medication_id)?;
        let MedicationSchedule::Controlled { count: current, .. } = med.schedule else {
            return Err(CareError::Validation("medication is not controlled".into()));
        };
        let initials = check_as_needed(&med, record, now)?;
        if administered_count <= 0 {
            return Err(CareError::Validation("administered count must be greater than zero".into()));
        }
        if administered_count > current {
            return Err(CareError::Validation("count exceeds remaining supply".into()));
        }
        let remaining = current - administered_count;

        let event = AdministrationEvent {
            id: Uuid::new_v4(),
            resident_id: record.resident_id,
            medication_id: record.medication_id,
            administered_at: record.administered_at,
            administered_by: initials,
            notes: record.notes.trim().to_string(),
            remaining_count: Some(remaining),
        };
        repository::insert_administration(conn, &event, now)?;
        repository::update_controlled_count(conn, &record.medication_id, remaining)?;
        Ok((event, remaining))
    })?;

    tracing::info!(
        medication_id = %event.medication_id,
        administered = administered_count,
        remaining,
        "Controlled medication dispensed"
    );
    Ok(event)
}

// ═══════════════════════════════════════════
// Read projections
// ═══════════════════════════════════════════

fn start_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn day_after(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

pub fn fetch_for_day(
    conn: &Connection,
    resident_id: &Uuid,
    date: NaiveDate,
) -> Result<LedgerView, CareError> {
    require_resident(conn, resident_id)?;
    Ok(LedgerView {
        scheduled: repository::get_chart_entries_between(conn, resident_id, date, date)?,
        administrations: repository::get_resident_administrations_between(
            conn,
            resident_id,
            start_of(date),
            start_of(day_after(date)),
        )?,
    })
}

pub fn fetch_for_month(
    conn: &Connection,
    resident_id: &Uuid,
    month: YearMonth,
) -> Result<LedgerView, CareError> {
    require_resident(conn, resident_id)?;
    Ok(LedgerView {
        scheduled: repository::get_chart_entries_between(
            conn,
            resident_id,
            month.first_day(),
            month.last_day(),
        )?,
        administrations: repository::get_resident_administrations_between(
            conn,
            resident_id,
            start_of(month.first_day()),
            start_of(month.next().first_day()),
        )?,
    })
}

/// Scheduled values recorded so far on `date`, as the daily view shows them.
pub fn fetch_current_for_date(
    conn: &Connection,
    resident_id: &Uuid,
    date: NaiveDate,
) -> Result<DaySlotValues, CareError> {
    Ok(repository::get_chart_entries_between(conn, resident_id, date, date)?
        .into_iter()
        .map(|e| ((e.medication_id, e.time_slot), e.administered))
        .collect())
}

/// PRN/controlled administrations of one medication within `[from, until)`.
pub(crate) fn administrations_between(
    conn: &Connection,
    medication_id: &Uuid,
    from: NaiveDate,
    until: NaiveDate,
) -> Result<Vec<AdministrationEvent>, CareError> {
    Ok(repository::get_administrations_between(
        conn,
        medication_id,
        start_of(from),
        start_of(until),
    )?)
}

pub(crate) fn day_end(date: NaiveDate) -> NaiveDate {
    day_after(date)
}

fn load_medication(conn: &Connection, key: &FieldKey, id: &Uuid) -> Result<Medication, CareError> {
    repository::get_medication(conn, key, id)?
        .ok_or_else(|| CareError::NotFound(format!("medication {id} not found")))
}
