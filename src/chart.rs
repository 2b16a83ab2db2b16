//! Monthly eMAR chart.
//!
//! Projects the ledger onto a fixed 31-column grid per resident and month.
//! Columns past the end of a short month are never populated. From the
//! discontinuation date onward every cell of a medication reads "DC",
//! whatever was recorded there.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::FieldKey;
use crate::db::{atomically, repository};
use crate::error::CareError;
use crate::ledger::{self, ScheduledRecord};
use crate::models::enums::{MedicationKind, TimeSlot};
use crate::models::{AdministrationEvent, Medication, MedicationSchedule, SlotRevision, YearMonth};
use crate::residents::require_resident;

pub const CHART_DAYS: usize = 31;

pub const DISCONTINUED_MARK: &str = "DC";
pub const ADMINISTERED_MARK: &str = "ADM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartCell {
    Blank,
    Recorded(String),
    Administered,
    Discontinued,
}

impl ChartCell {
    pub fn text(&self) -> &str {
        match self {
            Self::Blank => "",
            Self::Recorded(value) => value,
            Self::Administered => ADMINISTERED_MARK,
            Self::Discontinued => DISCONTINUED_MARK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartRow {
    pub medication_id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub kind: MedicationKind,
    /// Set for scheduled rows only; PRN and controlled get a single row.
    pub time_slot: Option<TimeSlot>,
    /// `cells[d - 1]` is day `d`.
    pub cells: Vec<ChartCell>,
}

impl ChartRow {
    pub fn cell(&self, day: u32) -> Option<&ChartCell> {
        (day as usize).checked_sub(1).and_then(|i| self.cells.get(i))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyChart {
    pub resident_id: Uuid,
    pub month: YearMonth,
    pub rows: Vec<ChartRow>,
}

impl MonthlyChart {
    pub fn row(&self, medication_id: &Uuid, slot: Option<TimeSlot>) -> Option<&ChartRow> {
        self.rows
            .iter()
            .find(|r| r.medication_id == *medication_id && r.time_slot == slot)
    }
}

/// One edited scheduled cell of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartEdit {
    pub medication_id: Uuid,
    pub time_slot: TimeSlot,
    pub day: u32,
    pub value: String,
}

// ═══════════════════════════════════════════
// Materialization
// ═══════════════════════════════════════════

fn build_cells(
    med: &Medication,
    month: YearMonth,
    mut content: impl FnMut(NaiveDate) -> ChartCell,
) -> Vec<ChartCell> {
    (1..=CHART_DAYS as u32)
        .map(|day| match month.day(day) {
            None => ChartCell::Blank,
            Some(date) if !med.is_active_on(date) => ChartCell::Discontinued,
            Some(date) => content(date),
        })
        .collect()
}

pub fn materialize(
    conn: &Connection,
    key: &FieldKey,
    resident_id: &Uuid,
    month: YearMonth,
) -> Result<MonthlyChart, CareError> {
    require_resident(conn, resident_id)?;
    let medications = repository::get_medications_for_resident(conn, key, resident_id)?;
    let view = ledger::fetch_for_month(conn, resident_id, month)?;

    let recorded: BTreeMap<(Uuid, NaiveDate, TimeSlot), String> = view
        .scheduled
        .into_iter()
        .map(|e| ((e.medication_id, e.date, e.time_slot), e.administered))
        .collect();
    let administered_days: BTreeSet<(Uuid, NaiveDate)> = view
        .administrations
        .iter()
        .map(|e| (e.medication_id, e.administered_at.date()))
        .collect();

    let mut rows = Vec::new();
    for med in &medications {
        match &med.schedule {
            MedicationSchedule::Scheduled { time_slots } => {
                for slot in time_slots {
                    let cells = build_cells(med, month, |date| {
                        match recorded.get(&(med.id, date, *slot)) {
                            Some(value) if !value.is_empty() => ChartCell::Recorded(value.clone()),
                            _ => ChartCell::Blank,
                        }
                    });
                    rows.push(chart_row(med, Some(*slot), cells));
                }
            }
            MedicationSchedule::Prn | MedicationSchedule::Controlled { .. } => {
                let cells = build_cells(med, month, |date| {
                    if administered_days.contains(&(med.id, date)) {
                        ChartCell::Administered
                    } else {
                        ChartCell::Blank
                    }
                });
                rows.push(chart_row(med, None, cells));
            }
        }
    }

    Ok(MonthlyChart { resident_id: *resident_id, month, rows })
}

fn chart_row(med: &Medication, time_slot: Option<TimeSlot>, cells: Vec<ChartCell>) -> ChartRow {
    ChartRow {
        medication_id: med.id,
        medication_name: med.name.clone(),
        dosage: med.dosage.clone(),
        kind: med.kind(),
        time_slot,
        cells,
    }
}

// ═══════════════════════════════════════════
// Grid editing
// ═══════════════════════════════════════════

/// Write edited scheduled cells back to the ledger. Every edit is checked
/// before anything is written; one bad cell rejects the whole batch.
/// Returns how many stored values changed.
pub fn save_chart_edits(
    conn: &Connection,
    key: &FieldKey,
    resident_id: &Uuid,
    month: YearMonth,
    edits: &[ChartEdit],
    changed_by: &str,
    now: NaiveDateTime,
) -> Result<usize, CareError> {
    let medications: BTreeMap<Uuid, Medication> =
        repository::get_medications_for_resident(conn, key, resident_id)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

    let mut records = Vec::with_capacity(edits.len());
    for edit in edits {
        let date = month.day(edit.day).ok_or_else(|| {
            CareError::Validation(format!("{month} has no day {}", edit.day))
        })?;
        let med = medications
            .get(&edit.medication_id)
            .ok_or_else(|| CareError::NotFound(format!("medication {} not found", edit.medication_id)))?;
        ledger::check_scheduled_target(med, resident_id, date, edit.time_slot)?;
        records.push(ScheduledRecord {
            resident_id: *resident_id,
            medication_id: edit.medication_id,
            date,
            time_slot: edit.time_slot,
            value: edit.value.clone(),
        });
    }

    let changed = atomically(conn, |conn| {
        let mut changed = 0;
        for record in &records {
            if ledger::write_scheduled(conn, record, changed_by, now)? {
                changed += 1;
            }
        }
        Ok::<_, CareError>(changed)
    })?;

    tracing::info!(resident_id = %resident_id, month = %month, changed, "Chart edits saved");
    Ok(changed)
}

// ═══════════════════════════════════════════
// Drill-down
// ═══════════════════════════════════════════

/// PRN/controlled administrations of one medication on one day.
pub fn day_detail(
    conn: &Connection,
    medication_id: &Uuid,
    date: NaiveDate,
) -> Result<Vec<AdministrationEvent>, CareError> {
    ledger::administrations_between(conn, medication_id, date, ledger::day_end(date))
}

/// PRN/controlled administrations of one medication across a month.
pub fn month_detail(
    conn: &Connection,
    medication_id: &Uuid,
    month: YearMonth,
) -> Result<Vec<AdministrationEvent>, CareError> {
    ledger::administrations_between(conn, medication_id, month.first_day(), month.next().first_day())
}

/// Every change made to one scheduled cell, oldest first.
pub fn slot_history(
    conn: &Connection,
    medication_id: &Uuid,
    date: NaiveDate,
    slot: TimeSlot,
) -> Result<Vec<SlotRevision>, CareError> {
    Ok(repository::get_chart_revisions(conn, medication_id, date, slot)?)
}

/// Whether anything was charted for the resident in `month`.
pub fn has_chart_data(conn: &Connection, resident_id: &Uuid, month: YearMonth) -> Result<bool, CareError> {
    let view = ledger::fetch_for_month(conn, resident_id, month)?;
    Ok(view.scheduled.iter().any(|e| !e.administered.is_empty()) || !view.administrations.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::*;
    use crate::db::repository::{insert_medication, set_medication_discontinued};
    use crate::db::sqlite::open_memory_database;
    use crate::ledger::{record_prn_or_controlled, record_scheduled, AsNeededRecord};
    use chrono::Datelike;

    fn march() -> YearMonth {
        YearMonth::new(2024, 3).unwrap()
    }

    fn texts(row: &ChartRow) -> Vec<&str> {
        row.cells.iter().map(ChartCell::text).collect()
    }

    #[test]
    fn grid_is_always_31_columns() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let med = scheduled_med(&r.id, "Aspirin", &[TimeSlot::Morning]);
        insert_medication(&conn, &key, &med).unwrap();
        set_medication_discontinued(&conn, &med.id, date(2024, 2, 10)).unwrap();

        let feb = materialize(&conn, &key, &r.id, YearMonth::new(2024, 2).unwrap()).unwrap();
        let row = feb.row(&med.id, Some(TimeSlot::Morning)).unwrap();
        assert_eq!(row.cells.len(), CHART_DAYS);
        assert_eq!(row.cell(9), Some(&ChartCell::Blank));
        assert_eq!(row.cell(10), Some(&ChartCell::Discontinued));
        assert_eq!(row.cell(29), Some(&ChartCell::Discontinued));
        assert_eq!(row.cell(30), Some(&ChartCell::Blank));
        assert_eq!(row.cell(0), None);
    }

    #[test]
    fn discontinuation_overrides_recorded_values() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let med = scheduled_med(&r.id, "Aspirin", &[TimeSlot::Morning]);
        insert_medication(&conn, &key, &med).unwrap();
        for day in [14, 15, 16] {
            let rec = ScheduledRecord {
                resident_id: r.id,
                medication_id: med.id,
                date: date(2024, 3, day),
                time_slot: TimeSlot::Morning,
                value: "JD".into(),
            };
            record_scheduled(&conn, &key, &rec, "nurse1", at(2024, 3, day, 9, 0)).unwrap();
        }
        set_medication_discontinued(&conn, &med.id, date(2024, 3, 15)).unwrap();

        let chart = materialize(&conn, &key, &r.id, march()).unwrap();
        let row = chart.row(&med.id, Some(TimeSlot::Morning)).unwrap();
        assert_eq!(row.cell(14).unwrap().text(), "JD");
        assert_eq!(row.cell(15).unwrap().text(), "DC");
        assert_eq!(row.cell(16).unwrap().text(), "DC");

        let april = materialize(&conn, &key, &r.id, YearMonth::new(2024, 4).unwrap()).unwrap();
        let row = april.row(&med.id, Some(TimeSlot::Morning)).unwrap();
        assert!(row.cells[..30].iter().all(|c| *c == ChartCell::Discontinued));
    }

    #[test]
    fn as_needed_rows_mark_administered_days() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let med = prn_med(&r.id, "Tylenol");
        insert_medication(&conn, &key, &med).unwrap();

        for hour in [8, 20] {
            let rec = AsNeededRecord {
                resident_id: r.id,
                medication_id: med.id,
                administered_at: at(2024, 3, 5, hour, 0),
                initials: "JD".into(),
                notes: String::new(),
            };
            record_prn_or_controlled(&conn, &key, &rec, None, at(2024, 3, 6, 0, 0)).unwrap();
        }

        let chart = materialize(&conn, &key, &r.id, march()).unwrap();
        let row = chart.row(&med.id, None).unwrap();
        let t = texts(row);
        assert_eq!(t[4], "ADM");
        assert_eq!(t.iter().filter(|c| !c.is_empty()).count(), 1);

        assert_eq!(day_detail(&conn, &med.id, date(2024, 3, 5)).unwrap().len(), 2);
        assert_eq!(month_detail(&conn, &med.id, march()).unwrap().len(), 2);
        assert!(has_chart_data(&conn, &r.id, march()).unwrap());
        assert!(!has_chart_data(&conn, &r.id, YearMonth::new(2024, 4).unwrap()).unwrap());
    }

    #[test]
    fn chart_edits_are_all_or_nothing() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        let mut med = scheduled_med(&r.id, "Aspirin", &[TimeSlot::Morning]);
        med.discontinued_on = Some(date(2024, 3, 20));
        insert_medication(&conn, &key, &med).unwrap();
        let edit = |day: u32| ChartEdit {
            medication_id: med.id,
            time_slot: TimeSlot::Morning,
            day,
            value: "jd".into(),
        };
        let now = at(2024, 3, 31, 9, 0);

        let bad = save_chart_edits(&conn, &key, &r.id, march(), &[edit(1), edit(25)], "nurse1", now);
        assert!(matches!(bad, Err(CareError::Validation(_))));
        let feb = save_chart_edits(&conn, &key, &r.id, YearMonth::new(2024, 2).unwrap(), &[edit(30)], "nurse1", now);
        assert!(matches!(feb, Err(CareError::Validation(_))));
        assert!(!has_chart_data(&conn, &r.id, march()).unwrap());

        let changed = save_chart_edits(&conn, &key, &r.id, march(), &[edit(1), edit(2)], "nurse1", now).unwrap();
        assert_eq!(changed, 2);
        let chart = materialize(&conn, &key, &r.id, march()).unwrap();
        assert_eq!(chart.row(&med.id, Some(TimeSlot::Morning)).unwrap().cell(2).unwrap().text(), "JD");

        let history = slot_history(&conn, &med.id, date(2024, 3, 1), TimeSlot::Morning).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].changed_by, "nurse1");
    }

    #[test]
    fn rows_follow_medication_order_and_slots() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = seed_resident(&conn, &key, "Jane Doe");
        insert_medication(&conn, &key, &prn_med(&r.id, "Tylenol")).unwrap();
        insert_medication(&conn, &key, &scheduled_med(&r.id, "Aspirin", &[TimeSlot::Night, TimeSlot::Morning]))
            .unwrap();

        let chart = materialize(&conn, &key, &r.id, march()).unwrap();
        let labels: Vec<_> = chart
            .rows
            .iter()
            .map(|row| (row.medication_name.as_str(), row.time_slot))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("Aspirin", Some(TimeSlot::Morning)),
                ("Aspirin", Some(TimeSlot::Night)),
                ("Tylenol", None),
            ]
        );
        assert_eq!(chart.month.first_day().day(), 1);
    }
}
