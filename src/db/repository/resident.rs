use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::crypto::FieldKey;
use crate::db::{parse_date, parse_datetime, parse_uuid, DatabaseError, DATETIME_FORMAT, DATE_FORMAT};
use crate::models::enums::LevelOfCare;
use crate::models::Resident;

const RESIDENT_COLUMNS: &str =
    "id, name, date_of_birth, level_of_care, created_at, removed_at";

pub fn insert_resident(
    conn: &Connection,
    key: &FieldKey,
    resident: &Resident,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO residents (id, name, date_of_birth, level_of_care, created_at, removed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            resident.id.to_string(),
            resident.name,
            key.seal_text(&resident.date_of_birth.format(DATE_FORMAT).to_string())?,
            key.seal_text(resident.level_of_care.as_str())?,
            resident.created_at.format(DATETIME_FORMAT).to_string(),
            resident.removed_at.map(|t| t.format(DATETIME_FORMAT).to_string()),
        ],
    )?;
    Ok(())
}

/// Fetch a resident by id, archived or not.
pub fn get_resident(
    conn: &Connection,
    key: &FieldKey,
    id: &Uuid,
) -> Result<Option<Resident>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {RESIDENT_COLUMNS} FROM residents WHERE id = ?1"),
            params![id.to_string()],
            resident_row_from_rusqlite,
        )
        .optional()?;
    row.map(|r| resident_from_row(key, r)).transpose()
}

/// Non-archived residents ordered by name.
pub fn list_residents(conn: &Connection, key: &FieldKey) -> Result<Vec<Resident>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESIDENT_COLUMNS} FROM residents WHERE removed_at IS NULL ORDER BY name"
    ))?;
    let rows = stmt.query_map([], resident_row_from_rusqlite)?;

    let mut residents = Vec::new();
    for row in rows {
        residents.push(resident_from_row(key, row?)?);
    }
    Ok(residents)
}

/// Whether the resident exists and has not been archived.
pub fn resident_is_active(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM residents WHERE id = ?1 AND removed_at IS NULL",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether the resident was ever admitted, archived or not.
pub fn resident_exists(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM residents WHERE id = ?1",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn count_residents(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM residents WHERE removed_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Whether a non-archived resident other than `exclude` already uses `name`.
pub fn resident_name_taken(
    conn: &Connection,
    name: &str,
    exclude: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM residents
         WHERE removed_at IS NULL AND LOWER(name) = LOWER(?1) AND id IS NOT ?2",
        params![name, exclude.map(|id| id.to_string())],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn update_resident(
    conn: &Connection,
    key: &FieldKey,
    resident: &Resident,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE residents SET name = ?2, date_of_birth = ?3, level_of_care = ?4 WHERE id = ?1",
        params![
            resident.id.to_string(),
            resident.name,
            key.seal_text(&resident.date_of_birth.format(DATE_FORMAT).to_string())?,
            key.seal_text(resident.level_of_care.as_str())?,
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Resident".into(),
            id: resident.id.to_string(),
        });
    }
    Ok(())
}

/// Mark a resident as removed. Returns false when already archived or unknown.
pub fn archive_resident(
    conn: &Connection,
    id: &Uuid,
    at: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE residents SET removed_at = ?2 WHERE id = ?1 AND removed_at IS NULL",
        params![id.to_string(), at.format(DATETIME_FORMAT).to_string()],
    )?;
    Ok(changed == 1)
}

// Internal row type for mapping
struct ResidentRow {
    id: String,
    name: String,
    date_of_birth: Vec<u8>,
    level_of_care: Vec<u8>,
    created_at: String,
    removed_at: Option<String>,
}

fn resident_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ResidentRow, rusqlite::Error> {
    Ok(ResidentRow {
        id: row.get(0)?,
        name: row.get(1)?,
        date_of_birth: row.get(2)?,
        level_of_care: row.get(3)?,
        created_at: row.get(4)?,
        removed_at: row.get(5)?,
    })
}

fn resident_from_row(key: &FieldKey, row: ResidentRow) -> Result<Resident, DatabaseError> {
    Ok(Resident {
        id: parse_uuid(&row.id)?,
        name: row.name,
        date_of_birth: parse_date(&key.open_text(&row.date_of_birth)?)?,
        level_of_care: LevelOfCare::from_str(&key.open_text(&row.level_of_care)?)?,
        created_at: parse_datetime(&row.created_at)?,
        removed_at: row.removed_at.as_deref().map(parse_datetime).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::make_resident;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_get_decrypts_fields() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = make_resident("Jane Doe");
        insert_resident(&conn, &key, &r).unwrap();

        let fetched = get_resident(&conn, &key, &r.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Jane Doe");
        assert_eq!(fetched.date_of_birth, r.date_of_birth);
        assert_eq!(fetched.level_of_care, LevelOfCare::Personal);
    }

    #[test]
    fn sensitive_columns_are_not_plaintext() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = make_resident("Jane Doe");
        insert_resident(&conn, &key, &r).unwrap();

        let raw: Vec<u8> = conn
            .query_row("SELECT level_of_care FROM residents", [], |row| row.get(0))
            .unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("Personal Care"));
    }

    #[test]
    fn archived_residents_leave_listing() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let a = make_resident("Alice Smith");
        let b = make_resident("Bob Jones");
        insert_resident(&conn, &key, &a).unwrap();
        insert_resident(&conn, &key, &b).unwrap();

        let now = a.created_at;
        assert!(archive_resident(&conn, &a.id, now).unwrap());
        assert!(!archive_resident(&conn, &a.id, now).unwrap());

        let names: Vec<_> = list_residents(&conn, &key)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Bob Jones"]);
        assert_eq!(count_residents(&conn).unwrap(), 1);
        assert!(!resident_is_active(&conn, &a.id).unwrap());
        assert!(resident_is_active(&conn, &b.id).unwrap());
        assert!(resident_exists(&conn, &a.id).unwrap());
        assert!(!resident_exists(&conn, &Uuid::new_v4()).unwrap());
        assert!(get_resident(&conn, &key, &a.id).unwrap().unwrap().removed_at.is_some());
    }

    #[test]
    fn name_check_is_case_insensitive_and_skips_self() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let r = make_resident("Jane Doe");
        insert_resident(&conn, &key, &r).unwrap();

        assert!(resident_name_taken(&conn, "jane doe", None).unwrap());
        assert!(!resident_name_taken(&conn, "Jane Doe", Some(&r.id)).unwrap());
        assert!(!resident_name_taken(&conn, "John Doe", None).unwrap());
    }

    #[test]
    fn update_unknown_resident_is_not_found() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        let result = update_resident(&conn, &key, &make_resident("Ghost"));
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }
}
