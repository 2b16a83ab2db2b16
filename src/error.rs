use thiserror::Error;

use crate::crypto::CryptoError;
use crate::db::DatabaseError;

// ═══════════════════════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════════════════════

/// Failure of a care operation. Every variant leaves stored state unchanged.
#[derive(Error, Debug)]
pub enum CareError {
    /// Caller-supplied data violates an invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(DatabaseError),

    /// Bad credentials, wrong vault passphrase, missing session or role.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal lock error")]
    LockPoisoned,
}

impl CareError {
    /// Terse text suitable for showing to the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Authentication(msg) => msg.clone(),
            Self::Storage(_) | Self::Io(_) | Self::LockPoisoned => {
                "storage failure, action aborted".into()
            }
            Self::Crypto(_) => "stored data could not be decrypted".into(),
        }
    }
}

impl From<DatabaseError> for CareError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity_type, id } => {
                CareError::NotFound(format!("{entity_type} {id} not found"))
            }
            DatabaseError::Crypto(c) => c.into(),
            other => CareError::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for CareError {
    fn from(e: rusqlite::Error) -> Self {
        CareError::Storage(DatabaseError::from(e))
    }
}

impl From<CryptoError> for CareError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::WrongPassphrase => CareError::Authentication("wrong passphrase".into()),
            CryptoError::Storage(db) => CareError::Storage(DatabaseError::from(db)),
            other => CareError::Crypto(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_keeps_entity_in_message() {
        let err: CareError = DatabaseError::NotFound {
            entity_type: "Medication".into(),
            id: "abc".into(),
        }
        .into();
        assert!(matches!(err, CareError::NotFound(_)));
        assert_eq!(err.user_message(), "Medication abc not found");
    }

    #[test]
    fn storage_errors_are_not_shown_raw() {
        let err: CareError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.user_message(), "storage failure, action aborted");
    }

    #[test]
    fn wrong_passphrase_is_authentication() {
        let err: CareError = CryptoError::WrongPassphrase.into();
        assert!(matches!(err, CareError::Authentication(_)));
    }

    #[test]
    fn nested_crypto_error_is_unwrapped() {
        let err: CareError = DatabaseError::Crypto(CryptoError::DecryptionFailed).into();
        assert!(matches!(err, CareError::Crypto(_)));
    }
}
