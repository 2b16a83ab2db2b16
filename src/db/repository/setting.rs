use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;

pub fn get_setting(conn: &Connection, name: &str) -> Result<Option<String>, DatabaseError> {
    let value = conn
        .query_row(
            "SELECT setting_value FROM user_settings WHERE setting_name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, name: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO user_settings (setting_name, setting_value) VALUES (?1, ?2)
         ON CONFLICT (setting_name) DO UPDATE SET setting_value = excluded.setting_value",
        params![name, value],
    )?;
    Ok(())
}
