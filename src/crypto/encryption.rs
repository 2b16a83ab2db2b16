//! Sealed column format for PHI fields.
//!
//! A sealed value is stored as one BLOB:
//! `[format byte][12-byte nonce][AES-256-GCM ciphertext + 16-byte tag]`.
//! The format byte is bound to the ciphertext as associated data, so a
//! rewritten header fails authentication rather than decoding as another
//! layout.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use super::keys::KEY_LENGTH;
use super::CryptoError;

/// Current column layout.
pub const SEALED_FORMAT: u8 = 1;

const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const HEADER_LENGTH: usize = 1 + NONCE_LENGTH;

/// One sealed field, as read from or written to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    format: u8,
    nonce: [u8; NONCE_LENGTH],
    ciphertext: Vec<u8>,
}

fn cipher(key_bytes: &[u8; KEY_LENGTH]) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes))
}

impl SealedBlob {
    /// Seal under a fresh random nonce.
    pub(crate) fn seal(key_bytes: &[u8; KEY_LENGTH], plaintext: &[u8]) -> Result<Self, CryptoError> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);

        let payload = Payload { msg: plaintext, aad: &[SEALED_FORMAT] };
        let ciphertext = cipher(key_bytes)
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(Self { format: SEALED_FORMAT, nonce, ciphertext })
    }

    pub(crate) fn open(&self, key_bytes: &[u8; KEY_LENGTH]) -> Result<Vec<u8>, CryptoError> {
        let payload = Payload { msg: self.ciphertext.as_slice(), aad: &[self.format] };
        cipher(key_bytes)
            .decrypt(Nonce::from_slice(&self.nonce), payload)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Column bytes for this value.
    pub fn to_column(&self) -> Vec<u8> {
        let mut column = Vec::with_capacity(HEADER_LENGTH + self.ciphertext.len());
        column.push(self.format);
        column.extend_from_slice(&self.nonce);
        column.extend_from_slice(&self.ciphertext);
        column
    }

    /// Split column bytes back into their parts. Fails on an unknown
    /// format byte or a value too short to carry a tag.
    pub fn from_column(column: &[u8]) -> Result<Self, CryptoError> {
        let Some((&format, rest)) = column.split_first() else {
            return Err(CryptoError::CorruptedData);
        };
        if format != SEALED_FORMAT {
            return Err(CryptoError::UnknownFormat(format));
        }
        if rest.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(CryptoError::CorruptedData);
        }
        let (nonce, ciphertext) = rest.split_at(NONCE_LENGTH);
        let nonce: [u8; NONCE_LENGTH] = nonce.try_into().map_err(|_| CryptoError::CorruptedData)?;
        Ok(Self { format, nonce, ciphertext: ciphertext.to_vec() })
    }
}
