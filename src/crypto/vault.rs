//! Passphrase vault: derives the field key that protects PHI columns.
//!
//! The first unlock of a fresh database stores a random salt and a
//! verification token (a fixed plaintext sealed with the derived key).
//! Every later unlock re-derives the key and must open that token.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::{params, Connection, OptionalExtension};
use subtle::ConstantTimeEq;

use super::encryption::SealedBlob;
use super::keys::{generate_salt, FieldKey, SALT_LENGTH};
use super::CryptoError;
use crate::db::DATETIME_FORMAT;

const VERIFICATION_PLAINTEXT: &[u8] = b"CARETECH_VAULT_VERIFICATION_V1";

/// Whether a passphrase has ever been set on this database.
pub fn is_vault_initialized(conn: &Connection) -> Result<bool, CryptoError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM vault_meta", [], |row| row.get(0))?;
    Ok(count > 0)
}

/// Derive the field key, initialising the vault on first use.
pub fn unlock_vault(
    conn: &Connection,
    passphrase: &str,
    iterations: u32,
) -> Result<FieldKey, CryptoError> {
    let meta: Option<(String, Vec<u8>)> = conn
        .query_row(
            "SELECT kdf_salt, verification FROM vault_meta WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match meta {
        None => initialize_vault(conn, passphrase, iterations),
        Some((salt_b64, token)) => {
            let salt = decode_salt(&salt_b64)?;
            let key = FieldKey::derive_with_iterations(passphrase, &salt, iterations);
            let sealed = SealedBlob::from_column(&token)?;
            let plain = key
                .open(&sealed)
                .map_err(|_| CryptoError::WrongPassphrase)?;
            if !bool::from(plain.as_slice().ct_eq(VERIFICATION_PLAINTEXT)) {
                return Err(CryptoError::WrongPassphrase);
            }
            tracing::info!("Vault unlocked");
            Ok(key)
        }
    }
}

fn initialize_vault(
    conn: &Connection,
    passphrase: &str,
    iterations: u32,
) -> Result<FieldKey, CryptoError> {
    let salt = generate_salt();
    let key = FieldKey::derive_with_iterations(passphrase, &salt, iterations);
    let token = key.seal(VERIFICATION_PLAINTEXT)?;

    conn.execute(
        "INSERT INTO vault_meta (id, kdf_salt, verification, created_at) VALUES (1, ?1, ?2, ?3)",
        params![
            STANDARD.encode(salt),
            token.to_column(),
            chrono::Local::now().naive_local().format(DATETIME_FORMAT).to_string(),
        ],
    )?;

    tracing::info!("Vault initialized");
    Ok(key)
}

fn decode_salt(salt_b64: &str) -> Result<[u8; SALT_LENGTH], CryptoError> {
    let bytes = STANDARD
        .decode(salt_b64)
        .map_err(|_| CryptoError::CorruptedData)?;
    bytes.try_into().map_err(|_| CryptoError::CorruptedData)
}
