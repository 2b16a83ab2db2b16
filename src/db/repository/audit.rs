use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, types::Value, params_from_iter, Connection};

use crate::crypto::FieldKey;
use crate::db::{parse_datetime, DatabaseError, DATETIME_FORMAT, DATE_FORMAT};
use crate::models::filters::AuditFilter;
use crate::models::AuditEntry;

pub fn insert_audit_entry(
    conn: &Connection,
    key: &FieldKey,
    timestamp: NaiveDateTime,
    username: &str,
    action: &str,
    description: &str,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO audit_logs (timestamp, username, action, description) VALUES (?1, ?2, ?3, ?4)",
        params![
            timestamp.format(DATETIME_FORMAT).to_string(),
            username,
            action,
            key.seal_text(description)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Entries matching every set filter, newest first. `now` anchors the ten-day window.
pub fn query_audit_entries(
    conn: &Connection,
    key: &FieldKey,
    filter: &AuditFilter,
    now: NaiveDateTime,
) -> Result<Vec<AuditEntry>, DatabaseError> {
    let mut sql = String::from(
        "SELECT id, timestamp, username, action, description FROM audit_logs WHERE 1 = 1",
    );
    let mut values: Vec<Value> = Vec::new();

    if filter.last_10_days {
        values.push(Value::Text((now - Duration::days(10)).format(DATETIME_FORMAT).to_string()));
        sql.push_str(&format!(" AND timestamp >= ?{}", values.len()));
    }
    if let Some(username) = &filter.username {
        values.push(Value::Text(username.clone()));
        sql.push_str(&format!(" AND username = ?{}", values.len()));
    }
    if let Some(action) = &filter.action {
        values.push(Value::Text(action.clone()));
        sql.push_str(&format!(" AND action = ?{}", values.len()));
    }
    if let Some(day) = filter.exact_date {
        values.push(Value::Text(day.format(DATE_FORMAT).to_string()));
        sql.push_str(&format!(" AND date(timestamp) = ?{}", values.len()));
    }
    sql.push_str(" ORDER BY timestamp DESC, id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Vec<u8>>(4)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, timestamp, username, action, sealed) = row?;
        entries.push(AuditEntry {
            id,
            timestamp: parse_datetime(&timestamp)?,
            username,
            action,
            description: key.open_text(&sealed)?,
        });
    }
    Ok(entries)
}

/// Distinct action tags, for filter pickers.
pub fn get_audit_actions(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT DISTINCT action FROM audit_logs ORDER BY action")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_key;
    use crate::db::repository::fixtures::{at, date};
    use crate::db::sqlite::open_memory_database;

    fn seed(conn: &Connection, key: &FieldKey) {
        insert_audit_entry(conn, key, at(2024, 3, 1, 9, 0), "admin", "Add Resident", "Added Jane Doe").unwrap();
        insert_audit_entry(conn, key, at(2024, 3, 12, 9, 0), "nurse1", "Dispense", "2 of Morphine").unwrap();
        insert_audit_entry(conn, key, at(2024, 3, 14, 9, 0), "admin", "Dispense", "1 of Morphine").unwrap();
    }

    #[test]
    fn description_is_encrypted_at_rest() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        seed(&conn, &key);
        let raw: Vec<u8> = conn
            .query_row("SELECT description FROM audit_logs WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("Jane"));
    }

    #[test]
    fn unfiltered_query_is_newest_first() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        seed(&conn, &key);
        let all = query_audit_entries(&conn, &key, &AuditFilter::default(), at(2024, 3, 15, 0, 0)).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].description, "1 of Morphine");
        assert_eq!(all[2].description, "Added Jane Doe");
    }

    #[test]
    fn filters_are_conjunctive() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        seed(&conn, &key);
        let now = at(2024, 3, 15, 0, 0);

        let recent = AuditFilter { last_10_days: true, ..Default::default() };
        assert_eq!(query_audit_entries(&conn, &key, &recent, now).unwrap().len(), 2);

        let admin_dispense = AuditFilter {
            username: Some("admin".into()),
            action: Some("Dispense".into()),
            ..Default::default()
        };
        let got = query_audit_entries(&conn, &key, &admin_dispense, now).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].timestamp, at(2024, 3, 14, 9, 0));

        let on_day = AuditFilter { exact_date: Some(date(2024, 3, 12)), ..Default::default() };
        let got = query_audit_entries(&conn, &key, &on_day, now).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].username, "nurse1");
    }

    #[test]
    fn distinct_actions() {
        let conn = open_memory_database().unwrap();
        let key = test_key();
        seed(&conn, &key);
        assert_eq!(get_audit_actions(&conn).unwrap(), vec!["Add Resident", "Dispense"]);
    }
}
