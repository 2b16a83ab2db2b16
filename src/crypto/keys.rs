use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::CryptoError;
use super::encryption::SealedBlob;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const KEY_LENGTH: usize = 32; // AES-256
pub const SALT_LENGTH: usize = 32;

/// Field encryption key derived from the operator passphrase, zeroed on drop
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct FieldKey {
    pub(super) key_bytes: [u8; KEY_LENGTH],
}

impl FieldKey {
    /// Derive from passphrase + salt using PBKDF2-SHA256 at production cost
    pub fn derive(passphrase: &str, salt: &[u8; SALT_LENGTH]) -> Self {
        Self::derive_with_iterations(passphrase, salt, PBKDF2_ITERATIONS)
    }

    /// Derive with an explicit iteration count (see `VaultConfig`)
    pub fn derive_with_iterations(passphrase: &str, salt: &[u8; SALT_LENGTH], iterations: u32) -> Self {
        let mut key_bytes = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha256>(
            passphrase.as_bytes(),
            salt,
            iterations.max(1),
            &mut key_bytes,
        );
        Self { key_bytes }
    }

    /// Seal raw bytes using AES-256-GCM
    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, CryptoError> {
        SealedBlob::seal(&self.key_bytes, plaintext)
    }

    pub fn open(&self, blob: &SealedBlob) -> Result<Vec<u8>, CryptoError> {
        blob.open(&self.key_bytes)
    }

    /// Seal a text field into its column bytes (see `SealedBlob`)
    pub fn seal_text(&self, text: &str) -> Result<Vec<u8>, CryptoError> {
        Ok(self.seal(text.as_bytes())?.to_column())
    }

    /// Open a column written by `seal_text`
    pub fn open_text(&self, column: &[u8]) -> Result<String, CryptoError> {
        let plain = self.open(&SealedBlob::from_column(column)?)?;
        String::from_utf8(plain).map_err(|_| CryptoError::CorruptedData)
    }
}

/// Generate a cryptographically random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
