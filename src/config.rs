use std::path::PathBuf;

use crate::crypto::{PASSWORD_HASH_ROUNDS, PBKDF2_ITERATIONS};

/// Application-level constants
pub const APP_NAME: &str = "CareTech";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the database file inside the data directory.
pub const DATABASE_FILE: &str = "resident_data.db";

/// Session inactivity timeout before the vault locks itself (minutes).
pub const INACTIVITY_TIMEOUT_MINUTES: i64 = 15;

/// Get the application data directory
/// ~/CareTech/ on all platforms; falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the facility database.
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Default destination for database backups.
pub fn backups_dir() -> PathBuf {
    app_data_dir().join("backups")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "caretech_lib=debug,warn"
    } else {
        "caretech_lib=info,warn"
    }
}

/// Cost parameters for the field key and stored password hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultConfig {
    pub kdf_iterations: u32,
    pub password_hash_rounds: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: PBKDF2_ITERATIONS,
            password_hash_rounds: PASSWORD_HASH_ROUNDS,
        }
    }
}

impl VaultConfig {
    /// Minimal cost, for tests and throwaway databases only.
    pub fn fast() -> Self {
        Self {
            kdf_iterations: 1,
            password_hash_rounds: 1,
        }
    }
}
