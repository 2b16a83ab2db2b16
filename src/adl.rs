//! Activities-of-daily-living chart: one row of 24 short codes per
//! resident-day, upserted from either the daily form or the month grid.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chart::CHART_DAYS;
use crate::db::{atomically, repository};
use crate::error::CareError;
use crate::models::{AdlEntry, AdlField, AdlValues, YearMonth};
use crate::residents::require_active_resident;

/// Month grid: for each field, `CHART_DAYS` values where index `d - 1` is day `d`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdlMonth {
    pub month: YearMonth,
    pub grid: BTreeMap<AdlField, Vec<String>>,
}

impl AdlMonth {
    pub fn empty(month: YearMonth) -> Self {
        let grid = AdlField::all()
            .iter()
            .map(|f| (*f, vec![String::new(); CHART_DAYS]))
            .collect();
        Self { month, grid }
    }

    pub fn get(&self, field: AdlField, day: u32) -> &str {
        (day as usize)
            .checked_sub(1)
            .and_then(|i| self.grid.get(&field)?.get(i))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn set(&mut self, field: AdlField, day: u32, value: impl Into<String>) {
        let Some(i) = (day as usize).checked_sub(1).filter(|i| *i < CHART_DAYS) else {
            return;
        };
        if let Some(column) = self.grid.get_mut(&field) {
            column[i] = value.into();
        }
    }

    fn values_for_day(&self, day: u32) -> AdlValues {
        let mut values = AdlValues::default();
        for field in AdlField::all() {
            values.set(*field, self.get(*field, day));
        }
        values
    }
}

fn normalized(values: &AdlValues) -> AdlValues {
    let mut out = AdlValues::default();
    for field in AdlField::all() {
        out.set(*field, values.get(*field).trim().to_uppercase());
    }
    out
}

/// Save one resident-day. Values are stored upper-cased.
pub fn save_adl_day(
    conn: &Connection,
    resident_id: &Uuid,
    date: NaiveDate,
    values: &AdlValues,
    now: NaiveDateTime,
) -> Result<AdlValues, CareError> {
    require_active_resident(conn, resident_id)?;
    let entry = AdlEntry {
        resident_id: *resident_id,
        date,
        values: normalized(values),
    };
    repository::upsert_adl_entry(conn, &entry, now)?;
    tracing::debug!(resident_id = %resident_id, %date, "ADL day saved");
    Ok(entry.values)
}

/// Stored values for one day, all blank when nothing was charted.
pub fn fetch_adl_day(
    conn: &Connection,
    resident_id: &Uuid,
    date: NaiveDate,
) -> Result<AdlValues, CareError> {
    Ok(repository::get_adl_entries_between(conn, resident_id, date, date)?
        .into_iter()
        .next()
        .map(|e| e.values)
        .unwrap_or_default())
}

pub fn fetch_adl_month(
    conn: &Connection,
    resident_id: &Uuid,
    month: YearMonth,
) -> Result<AdlMonth, CareError> {
    let mut grid = AdlMonth::empty(month);
    for entry in
        repository::get_adl_entries_between(conn, resident_id, month.first_day(), month.last_day())?
    {
        let day = chrono::Datelike::day(&entry.date);
        for field in AdlField::all() {
            grid.set(*field, day, entry.values.get(*field));
        }
    }
    Ok(grid)
}

/// Upsert every real day of the month from the grid, in one transaction.
pub fn save_adl_month(
    conn: &Connection,
    resident_id: &Uuid,
    grid: &AdlMonth,
    now: NaiveDateTime,
) -> Result<(), CareError> {
    require_active_resident(conn, resident_id)?;
    atomically(conn, |conn| {
        for day in 1..=grid.month.days_in_month() {
            let Some(date) = grid.month.day(day) else { continue };
            let entry = AdlEntry {
                resident_id: *resident_id,
                date,
                values: normalized(&grid.values_for_day(day)),
            };
            repository::upsert_adl_entry(conn, &entry, now)?;
        }
        Ok::<_, CareError>(())
    })?;
    tracing::info!(resident_id = %resident_id, month = %grid.month, "ADL month saved");
    Ok(())
}

/// Audit text listing each changed field.
pub fn describe_adl_changes(old: &AdlValues, new: &AdlValues) -> String {
    let changes: Vec<String> = AdlField::all()
        .iter()
        .filter(|f| old.get(**f) != new.get(**f))
        .map(|f| format!("{} changed from '{}' to '{}'", f.as_str(), old.get(*f), new.get(*f)))
        .collect();
    if changes.is_empty() {
        "No changes made to ADL data.".to_string()
    } else {
        format!("ADL Changes: {}", changes.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::{at, date, seed_resident};
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn day_values_are_upper_cased() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let mut values = AdlValues::default();
        values.set(AdlField::FirstShiftSp, " jd ");
        values.set(AdlField::Breakfast, "75");
        save_adl_day(&conn, &r.id, date(2024, 3, 4), &values, at(2024, 3, 4, 9, 0)).unwrap();

        let stored = fetch_adl_day(&conn, &r.id, date(2024, 3, 4)).unwrap();
        assert_eq!(stored.get(AdlField::FirstShiftSp), "JD");
        assert_eq!(stored.get(AdlField::Breakfast), "75");
        assert!(fetch_adl_day(&conn, &r.id, date(2024, 3, 5)).unwrap().is_blank());
    }

    #[test]
    fn month_grid_round_trip_skips_missing_days() {
        let conn = open_memory_database().unwrap();
        let r = seed_resident(&conn, &test_key(), "Jane Doe");
        let feb = YearMonth::new(2023, 2).unwrap();
        let mut grid = AdlMonth::empty(feb);
        grid.set(AdlField::Shower, 1, "ab");
        grid.set(AdlField::Shower, 28, "cd");
        grid.set(AdlField::Shower, 30, "XX");
        save_adl_month(&conn, &r.id, &grid, at(2023, 3, 1, 9, 0)).unwrap();

        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM adl_chart", [], |r| r.get(0)).unwrap();
        assert_eq!(rows, 28);

        let fetched = fetch_adl_month(&conn, &r.id, feb).unwrap();
        assert_eq!(fetched.get(AdlField::Shower, 1), "AB");
        assert_eq!(fetched.get(AdlField::Shower, 28), "CD");
        assert_eq!(fetched.get(AdlField::Shower, 30), "");
        assert_eq!(fetched.grid[&AdlField::Shower].len(), CHART_DAYS);
    }

    #[test]
    fn change_description_lists_fields() {
        let old = AdlValues::default();
        let mut new = AdlValues::default();
        assert_eq!(describe_adl_changes(&old, &new), "No changes made to ADL data.");

        new.set(AdlField::Shower, "JD");
        new.set(AdlField::Lunch, "50");
        assert_eq!(
            describe_adl_changes(&old, &new),
            "ADL Changes: shower changed from '' to 'JD'; lunch changed from '' to '50'"
        );
    }

    #[test]
    fn archived_resident_rejected() {
        let conn = open_memory_database().unwrap();
        let result = save_adl_day(&conn, &Uuid::new_v4(), date(2024, 3, 4), &AdlValues::default(), at(2024, 3, 4, 9, 0));
        assert!(matches!(result, Err(CareError::NotFound(_))));
    }
}
