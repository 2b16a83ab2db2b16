//! Audit log: append-only record of who did what, with descriptions
//! sealed at rest.
//!
//! The table rejects UPDATE and DELETE at the storage level, so entries
//! can only ever be appended and read.

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::crypto::FieldKey;
use crate::db::repository;
use crate::error::CareError;
use crate::models::filters::AuditFilter;
use crate::models::AuditEntry;

/// Action tags written by the core.
pub mod actions {
    pub const LOGIN: &str = "Login";
    pub const LOGIN_FAILED: &str = "Login Failed";
    pub const LOGOUT: &str = "Logout";
    pub const CREATE_USER: &str = "Create User";
    pub const REMOVE_USER: &str = "Remove User";
    pub const CHANGE_PASSWORD: &str = "Change Password";
    pub const ADD_RESIDENT: &str = "Add Resident";
    pub const EDIT_RESIDENT: &str = "Edit Resident";
    pub const REMOVE_RESIDENT: &str = "Remove Resident";
    pub const ADD_MEDICATION: &str = "Add Medication";
    pub const EDIT_MEDICATION: &str = "Edit Medication";
    pub const DISCONTINUE_MEDICATION: &str = "Discontinue Medication";
    pub const REMOVE_MEDICATION: &str = "Remove Medication";
    pub const ADD_ORDER: &str = "Add Non-Med Order";
    pub const EDIT_ORDER: &str = "Edit Non-Med Order";
    pub const PERFORM_ORDER: &str = "Perform Non-Med Order";
    pub const DISCONTINUE_ORDER: &str = "Discontinue Non-Med Order";
    pub const REMOVE_ORDER: &str = "Remove Non-Med Order";
    pub const EMAR_RECORD: &str = "eMAR Record";
    pub const EMAR_CHART_EDIT: &str = "eMAR Chart Edit";
    pub const PRN_ADMINISTRATION: &str = "PRN Administration";
    pub const CONTROLLED_DISPENSE: &str = "Controlled Dispense";
    pub const ADL_UPDATE: &str = "ADL Update";
    pub const BACKUP: &str = "Backup";
    pub const SETTINGS: &str = "Settings";
}

/// Append an entry timestamped `now`. Fails only on storage errors.
pub fn log_action(
    conn: &Connection,
    key: &FieldKey,
    username: &str,
    action: &str,
    description: &str,
    now: NaiveDateTime,
) -> Result<i64, CareError> {
    let id = repository::insert_audit_entry(conn, key, now, username, action, description)?;
    tracing::debug!(audit_id = id, action, "Audit entry appended");
    Ok(id)
}

/// Matching entries, newest first. Filters combine with AND.
pub fn query_audit(
    conn: &Connection,
    key: &FieldKey,
    filter: &AuditFilter,
    now: NaiveDateTime,
) -> Result<Vec<AuditEntry>, CareError> {
    Ok(repository::query_audit_entries(conn, key, filter, now)?)
}

pub fn list_actions(conn: &Connection) -> Result<Vec<String>, CareError> {
    Ok(repository::get_audit_actions(conn)?)
}
