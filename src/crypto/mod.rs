pub mod keys;
pub mod encryption;
pub mod password;
pub mod vault;
mod phi_audit;

pub use keys::*;
pub use encryption::*;
pub use password::*;
pub use vault::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("Corrupted encrypted field")]
    CorruptedData,

    #[error("Unknown sealed field format {0}")]
    UnknownFormat(u8),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Vault storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Cheap key for unit tests: a single PBKDF2 round.
#[cfg(test)]
pub(crate) fn test_key() -> FieldKey {
    FieldKey::derive_with_iterations("test_passphrase", &[7u8; SALT_LENGTH], 1)
}
