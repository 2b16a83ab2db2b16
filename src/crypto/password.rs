//! One-way password hashing for user accounts (PBKDF2-SHA256, PHC string format).

use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};

use super::CryptoError;

pub const PASSWORD_HASH_ROUNDS: u32 = 600_000;
const PASSWORD_SALT_LENGTH: usize = 16;

/// Hash a password into a self-describing PHC string (`$pbkdf2-sha256$i=...`).
pub fn hash_password(password: &str, rounds: u32) -> Result<String, CryptoError> {
    use rand::RngCore;
    let mut salt_bytes = [0u8; PASSWORD_SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))?;

    let params = Params {
        rounds: rounds.max(1),
        output_length: 32,
    };
    let hash = Pbkdf2
        .hash_password_customized(password.as_bytes(), None, None, params, &salt)
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}
