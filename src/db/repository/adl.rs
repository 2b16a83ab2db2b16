use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params_from_iter, types::Value, Connection};
use uuid::Uuid;

use crate::db::{parse_date, DatabaseError, DATETIME_FORMAT, DATE_FORMAT};
use crate::models::{AdlEntry, AdlField, AdlValues};

fn field_columns() -> String {
    AdlField::all()
        .iter()
        .map(AdlField::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Insert or replace every field of one resident-day.
pub fn upsert_adl_entry(
    conn: &Connection,
    entry: &AdlEntry,
    updated_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let fields = AdlField::all();
    let placeholders = (1..=fields.len() + 3)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = fields
        .iter()
        .map(|f| format!("{0} = excluded.{0}", f.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO adl_chart (resident_id, chart_date, updated_at, {})
         VALUES ({placeholders})
         ON CONFLICT (resident_id, chart_date) DO UPDATE SET {updates}, updated_at = excluded.updated_at",
        field_columns()
    );

    let mut values: Vec<Value> = vec![
        Value::Text(entry.resident_id.to_string()),
        Value::Text(entry.date.format(DATE_FORMAT).to_string()),
        Value::Text(updated_at.format(DATETIME_FORMAT).to_string()),
    ];
    values.extend(fields.iter().map(|f| Value::Text(entry.values.get(*f).to_string())));

    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

/// Stored ADL rows of a resident with `from <= date <= to`, by date.
pub fn get_adl_entries_between(
    conn: &Connection,
    resident_id: &Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AdlEntry>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT chart_date, {} FROM adl_chart
         WHERE resident_id = ?1 AND chart_date BETWEEN ?2 AND ?3
         ORDER BY chart_date",
        field_columns()
    ))?;
    let rows = stmt.query_map(
        rusqlite::params![
            resident_id.to_string(),
            from.format(DATE_FORMAT).to_string(),
            to.format(DATE_FORMAT).to_string(),
        ],
        |row| {
            let chart_date: String = row.get(0)?;
            let mut values = AdlValues::default();
            for (i, field) in AdlField::all().iter().enumerate() {
                values.set(*field, row.get::<_, String>(i + 1)?);
            }
            Ok((chart_date, values))
        },
    )?;

    let mut entries = Vec::new();
    for row in rows {
        let (chart_date, values) = row?;
        entries.push(AdlEntry {
            resident_id: *resident_id,
            date: parse_date(&chart_date)?,
            values,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn upsert_replaces_the_day() {
        let conn = open_memory_database().unwrap();
        let resident = seed_resident(&conn, &test_key(), "Jane Doe");
        let mut values = AdlValues::default();
        values.set(AdlField::Breakfast, "75");
        values.set(AdlField::Shower, "JD");
        let mut entry = AdlEntry { resident_id: resident.id, date: date(2024, 3, 5), values };
        upsert_adl_entry(&conn, &entry, at(2024, 3, 5, 9, 0)).unwrap();

        entry.values.set(AdlField::Breakfast, "100");
        upsert_adl_entry(&conn, &entry, at(2024, 3, 5, 10, 0)).unwrap();

        let rows = get_adl_entries_between(&conn, &resident.id, date(2024, 3, 1), date(2024, 3, 31))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values.get(AdlField::Breakfast), "100");
        assert_eq!(rows[0].values.get(AdlField::Shower), "JD");
        assert_eq!(rows[0].values.get(AdlField::Lunch), "");
    }
}
