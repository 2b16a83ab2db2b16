use std::path::Path;

use rusqlite::Connection;
use tracing;

use super::DatabaseError;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run `f` as one atomic unit: a SAVEPOINT that is released on `Ok` and
/// rolled back on `Err`. Savepoints nest, so a unit may call other units
/// and the outermost one decides what reaches the file.
pub fn atomically<T, E>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<rusqlite::Error>,
{
    conn.execute_batch("SAVEPOINT atomic_unit")?;
    let outcome = f(conn).and_then(|value| {
        conn.execute_batch("RELEASE atomic_unit")?;
        Ok(value)
    });
    if outcome.is_err() {
        if let Err(e) = conn.execute_batch("ROLLBACK TO atomic_unit; RELEASE atomic_unit") {
            tracing::error!("Savepoint rollback failed: {e}");
        }
    }
    outcome
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
        (2, include_str!("../../resources/migrations/002_chart_revisions.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, Option<i64>>(0),
    )
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM user_settings", [], |row| row.get(0))
            .unwrap()
    }

    fn put(conn: &Connection, name: &str) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO user_settings (setting_name, setting_value) VALUES (?1, 'x')",
            [name],
        )?;
        Ok(())
    }

    #[test]
    fn atomic_unit_commits_on_ok() {
        let conn = open_memory_database().unwrap();
        atomically(&conn, |c| put(c, "a")).unwrap();
        assert_eq!(setting_count(&conn), 1);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn atomic_unit_rolls_back_on_err() {
        let conn = open_memory_database().unwrap();
        let result: Result<(), DatabaseError> = atomically(&conn, |c| {
            put(c, "a")?;
            put(c, "a")
        });
        assert!(result.is_err());
        assert_eq!(setting_count(&conn), 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn failing_outer_unit_discards_released_inner_unit() {
        let conn = open_memory_database().unwrap();
        let result: Result<(), DatabaseError> = atomically(&conn, |c| {
            atomically(c, |inner| put(inner, "inner"))?;
            Err(DatabaseError::ConstraintViolation("outer step failed".into()))
        });
        assert!(result.is_err());
        assert_eq!(setting_count(&conn), 0);
    }

    #[test]
    fn database_initializes_all_tables() {
        let conn = open_memory_database().unwrap();
        // 13 tables from v1 + emar_chart_revisions from v2 (sqlite_sequence is filtered)
        let count = count_tables(&conn).unwrap();
        assert_eq!(count, 14, "Expected 14 tables, got {count}");
    }

    #[test]
    fn schema_version_is_current() {
        let conn = open_memory_database().unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn migration_idempotent() {
        let conn = open_memory_database().unwrap();
        let result = run_migrations(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn audit_log_rejects_updates_and_deletes() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO audit_logs (timestamp, username, action, description)
             VALUES ('2024-03-01 08:00:00', 'admin', 'Login', x'00')",
            [],
        )
        .unwrap();
        assert!(conn.execute("UPDATE audit_logs SET username = 'x'", []).is_err());
        assert!(conn.execute("DELETE FROM audit_logs", []).is_err());
    }

    #[test]
    fn file_database_reopens_without_rerunning_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caretech.db");
        drop(open_database(&path).unwrap());
        let conn = open_database(&path).unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 2);
    }
}
