//! User settings and scheduled database backups.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::repository;
use crate::error::CareError;
use crate::models::enums::BackupFrequency;

pub const DEFAULT_THEME: &str = "DarkBlue";
pub const DEFAULT_FONT: &str = "Arial";

const THEME_SETTING: &str = "theme";
const FONT_SETTING: &str = "font";
const BACKUP_SETTING: &str = "backup_config";

// ═══════════════════════════════════════════
// Display settings
// ═══════════════════════════════════════════

pub fn get_theme(conn: &Connection) -> Result<String, CareError> {
    Ok(repository::get_setting(conn, THEME_SETTING)?.unwrap_or_else(|| DEFAULT_THEME.into()))
}

pub fn set_theme(conn: &Connection, theme: &str) -> Result<(), CareError> {
    Ok(repository::set_setting(conn, THEME_SETTING, theme.trim())?)
}

pub fn get_font(conn: &Connection) -> Result<String, CareError> {
    Ok(repository::get_setting(conn, FONT_SETTING)?.unwrap_or_else(|| DEFAULT_FONT.into()))
}

pub fn set_font(conn: &Connection, font: &str) -> Result<(), CareError> {
    Ok(repository::set_setting(conn, FONT_SETTING, font.trim())?)
}

// ═══════════════════════════════════════════
// Backups
// ═══════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub folder: PathBuf,
    pub frequency: BackupFrequency,
    pub last_backup_date: Option<NaiveDate>,
}

pub fn get_backup_config(conn: &Connection) -> Result<Option<BackupConfig>, CareError> {
    match repository::get_setting(conn, BACKUP_SETTING)? {
        None => Ok(None),
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CareError::Validation(format!("stored backup configuration is unreadable: {e}"))),
    }
}

pub fn save_backup_config(conn: &Connection, config: &BackupConfig) -> Result<(), CareError> {
    if config.folder.as_os_str().is_empty() {
        return Err(CareError::Validation("choose a backup folder".into()));
    }
    let json = serde_json::to_string(config)
        .map_err(|e| CareError::Validation(format!("backup configuration: {e}")))?;
    repository::set_setting(conn, BACKUP_SETTING, &json)?;
    Ok(())
}

/// Daily backups are due after one day, weekly after seven. Never backed up is due.
pub fn is_backup_due(config: &BackupConfig, today: NaiveDate) -> bool {
    let Some(last) = config.last_backup_date else {
        return true;
    };
    let interval = match config.frequency {
        BackupFrequency::Daily => 1,
        BackupFrequency::Weekly => 7,
    };
    (today - last).num_days() >= interval
}

/// Copy the database file into the backup folder as `backup_YYYYMMDD_HHMMSS.db`.
pub fn perform_backup(
    db_path: &Path,
    config: &BackupConfig,
    now: NaiveDateTime,
) -> Result<PathBuf, CareError> {
    fs::create_dir_all(&config.folder)?;
    let target = config
        .folder
        .join(format!("backup_{}.db", now.format("%Y%m%d_%H%M%S")));
    fs::copy(db_path, &target)?;
    tracing::info!(target = %target.display(), "Database backup written");
    Ok(target)
}

/// Run a backup when one is configured and due, then record the date.
pub fn backup_if_due(
    conn: &Connection,
    db_path: &Path,
    now: NaiveDateTime,
) -> Result<Option<PathBuf>, CareError> {
    let Some(mut config) = get_backup_config(conn)? else {
        return Ok(None);
    };
    if !is_backup_due(&config, now.date()) {
        return Ok(None);
    }
    let target = perform_backup(db_path, &config, now)?;
    config.last_backup_date = Some(now.date());
    save_backup_config(conn, &config)?;
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{at, date};
    use crate::db::sqlite::{open_database, open_memory_database};

    fn config(folder: PathBuf, frequency: BackupFrequency, last: Option<NaiveDate>) -> BackupConfig {
        BackupConfig { folder, frequency, last_backup_date: last }
    }

    #[test]
    fn settings_have_defaults() {
        let conn = open_memory_database().unwrap();
        assert_eq!(get_theme(&conn).unwrap(), "DarkBlue");
        assert_eq!(get_font(&conn).unwrap(), "Arial");
        set_theme(&conn, "LightGreen").unwrap();
        set_font(&conn, "Helvetica").unwrap();
        assert_eq!(get_theme(&conn).unwrap(), "LightGreen");
        assert_eq!(get_font(&conn).unwrap(), "Helvetica");
    }

    #[test]
    fn due_intervals() {
        let daily = config("b".into(), BackupFrequency::Daily, Some(date(2024, 3, 1)));
        assert!(!is_backup_due(&daily, date(2024, 3, 1)));
        assert!(is_backup_due(&daily, date(2024, 3, 2)));

        let weekly = config("b".into(), BackupFrequency::Weekly, Some(date(2024, 3, 1)));
        assert!(!is_backup_due(&weekly, date(2024, 3, 7)));
        assert!(is_backup_due(&weekly, date(2024, 3, 8)));

        assert!(is_backup_due(&config("b".into(), BackupFrequency::Weekly, None), date(2024, 3, 1)));
    }

    #[test]
    fn config_round_trips_through_settings() {
        let conn = open_memory_database().unwrap();
        assert_eq!(get_backup_config(&conn).unwrap(), None);
        let cfg = config("/mnt/backups".into(), BackupFrequency::Daily, Some(date(2024, 3, 1)));
        save_backup_config(&conn, &cfg).unwrap();
        assert_eq!(get_backup_config(&conn).unwrap(), Some(cfg));
        assert!(save_backup_config(&conn, &config(PathBuf::new(), BackupFrequency::Daily, None)).is_err());
    }

    #[test]
    fn backup_copies_database_and_records_date() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("resident_data.db");
        let conn = open_database(&db_path).unwrap();
        let backups = dir.path().join("backups");
        save_backup_config(&conn, &config(backups.clone(), BackupFrequency::Weekly, None)).unwrap();

        let now = at(2024, 3, 5, 14, 30);
        let written = backup_if_due(&conn, &db_path, now).unwrap().unwrap();
        assert_eq!(written, backups.join("backup_20240305_143000.db"));
        assert!(written.exists());

        assert_eq!(get_backup_config(&conn).unwrap().unwrap().last_backup_date, Some(date(2024, 3, 5)));
        assert_eq!(backup_if_due(&conn, &db_path, at(2024, 3, 6, 9, 0)).unwrap(), None);

        let copy = open_database(&written).unwrap();
        let version: i64 = copy
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
