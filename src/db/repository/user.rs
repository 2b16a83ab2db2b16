use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{parse_datetime, parse_uuid, DatabaseError, DATETIME_FORMAT};
use crate::models::enums::Role;
use crate::models::User;

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO users (id, username, password_hash, role, initials, is_temp_password, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id.to_string(),
            user.username,
            user.password_hash,
            user.role.as_str(),
            user.initials,
            user.is_temp_password,
            user.created_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> Result<Option<User>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, username, password_hash, role, initials, is_temp_password, created_at
             FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, bool>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    row.map(
        |(id, username, password_hash, role, initials, is_temp_password, created_at)| {
            Ok(User {
                id: parse_uuid(&id)?,
                username,
                password_hash,
                role: Role::from_str(&role)?,
                initials,
                is_temp_password,
                created_at: parse_datetime(&created_at)?,
            })
        },
    )
    .transpose()
}

pub fn count_users(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count)
}

pub fn list_usernames(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT username FROM users ORDER BY username")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Replace the password hash; `initials` of `None` keeps the stored ones.
pub fn update_user_credentials(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    initials: Option<&str>,
    is_temp_password: bool,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2, initials = COALESCE(?3, initials), is_temp_password = ?4
         WHERE username = ?1",
        params![username, password_hash, initials, is_temp_password],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "User".into(),
            id: username.to_string(),
        });
    }
    Ok(())
}

pub fn delete_user(conn: &Connection, username: &str) -> Result<bool, DatabaseError> {
    let removed = conn.execute("DELETE FROM users WHERE username = ?1", params![username])?;
    Ok(removed == 1)
}
