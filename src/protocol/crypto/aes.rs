use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use super::{AuthError, lengths};

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Ephemeral AES-128 key and IV for one RAOP session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    key: [u8; lengths::AES_128_KEY],
    iv: [u8; lengths::AES_IV],
}

impl SessionKey {
    /// Draw a fresh key and IV from the OS RNG
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RandomSourceFailed` if the OS RNG fails.
    pub fn generate() -> Result<Self, AuthError> {
        let mut key = [0u8; lengths::AES_128_KEY];
        let mut iv = [0u8; lengths::AES_IV];
        OsRng
            .try_fill_bytes(&mut key)
            .and_then(|()| OsRng.try_fill_bytes(&mut iv))
            .map_err(|_| AuthError::RandomSourceFailed)?;
        Ok(Self { key, iv })
    }

    /// Build from raw bytes
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidKeyLength` unless both are 16 bytes.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self, AuthError> {
        let key: [u8; lengths::AES_128_KEY] =
            key.try_into().map_err(|_| AuthError::InvalidKeyLength {
                expected: lengths::AES_128_KEY,
                actual: key.len(),
            })?;
        let iv: [u8; lengths::AES_IV] = iv.try_into().map_err(|_| AuthError::InvalidKeyLength {
            expected: lengths::AES_IV,
            actual: iv.len(),
        })?;
        Ok(Self { key, iv })
    }

    /// AES key bytes
    #[must_use]
    pub fn key(&self) -> &[u8; lengths::AES_128_KEY] {
        &self.key
    }

    /// IV bytes
    #[must_use]
    pub fn iv(&self) -> &[u8; lengths::AES_IV] {
        &self.iv
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").finish_non_exhaustive()
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// AES-128-CBC with PKCS#7 padding
///
/// Every packet restarts from the session IV.
#[derive(Debug, Clone)]
pub struct Aes128Cbc {
    key: SessionKey,
}

impl Aes128Cbc {
    /// Cipher over a session key
    #[must_use]
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    /// Encrypt one payload
    #[must_use]
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        Encryptor::new(&self.key.key.into(), &self.key.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypt one payload
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DecryptFailed` if the padding is invalid.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AuthError> {
        Decryptor::new(&self.key.key.into(), &self.key.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|e| AuthError::DecryptFailed(e.to_string()))
    }
}
