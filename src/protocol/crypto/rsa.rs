//! RSA for RAOP key exchange

use base64::Engine as _;
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{BigUint, Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use super::{AuthError, b64};

/// RSA key sizes used in RAOP
pub mod sizes {
    /// Sender keypair modulus size
    pub const CLIENT_MODULUS_BITS: usize = 512;
    /// Shortest raw modulus accepted from a receiver
    pub const MIN_RAW_MODULUS_BYTES: usize = 32;
    /// Public exponent paired with a raw modulus
    pub const PUBLIC_EXPONENT: u32 = 65537;
}

/// RSA keypair
#[derive(Clone)]
pub struct RaopRsaPrivateKey {
    inner: RsaPrivateKey,
}

impl RaopRsaPrivateKey {
    /// Generate a keypair with the given modulus size
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeygenFailed` if the RSA backend fails.
    pub fn generate(bits: usize) -> Result<Self, AuthError> {
        let inner = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| AuthError::KeygenFailed(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Public half
    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.inner.to_public_key()
    }

    /// `SubjectPublicKeyInfo` PEM
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeygenFailed` if the key cannot be encoded.
    pub fn public_key_pem(&self) -> Result<String, AuthError> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| AuthError::KeygenFailed(e.to_string()))
    }

    /// `SubjectPublicKeyInfo` DER
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeygenFailed` if the key cannot be encoded.
    pub fn public_key_der(&self) -> Result<Vec<u8>, AuthError> {
        self.public_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| AuthError::KeygenFailed(e.to_string()))
    }

    /// Big-endian modulus bytes
    #[must_use]
    pub fn modulus(&self) -> Vec<u8> {
        use rsa::traits::PublicKeyParts;
        self.inner.n().to_bytes_be()
    }

    /// Decrypt an RSA-OAEP(SHA-1) ciphertext
    ///
    /// # Errors
    ///
    /// Returns `AuthError::DecryptFailed` on padding or size errors.
    pub fn decrypt_oaep(&self, ciphertext: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.inner
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map_err(|e| AuthError::DecryptFailed(e.to_string()))
    }

    /// Raw PKCS#1 v1.5 signature, as receivers produce for `Apple-Response`
    ///
    /// # Errors
    ///
    /// Returns `AuthError::EncryptFailed` if the message is too long for the key.
    pub fn sign_raw(&self, message: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.inner
            .sign(Pkcs1v15Sign::new_unprefixed(), message)
            .map_err(|e| AuthError::EncryptFailed(e.to_string()))
    }
}

/// Parse a receiver's public key
///
/// Tries PEM (SPKI, then PKCS#1), DER (SPKI, then PKCS#1), base64-wrapped
/// DER, and finally a raw big-endian modulus with exponent 65537.
///
/// # Errors
///
/// Returns `AuthError::UnsupportedKeyFormat` if no encoding matches.
pub fn parse_public_key(bytes: &[u8]) -> Result<RsaPublicKey, AuthError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let text = text.trim();
        if text.starts_with("-----BEGIN") {
            if let Ok(key) = RsaPublicKey::from_public_key_pem(text) {
                return Ok(key);
            }
            return RsaPublicKey::from_pkcs1_pem(text).map_err(|_| AuthError::UnsupportedKeyFormat);
        }
    }

    if let Some(key) = parse_der(bytes) {
        return Ok(key);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        let compact: String = text.split_whitespace().collect();
        let decoded = b64::RAOP.decode(compact).ok();
        if let Some(key) = decoded.as_deref().and_then(parse_der) {
            return Ok(key);
        }
    }

    if bytes.len() >= sizes::MIN_RAW_MODULUS_BYTES {
        let n = BigUint::from_bytes_be(bytes);
        let e = BigUint::from(sizes::PUBLIC_EXPONENT);
        if let Ok(key) = RsaPublicKey::new(n, e) {
            return Ok(key);
        }
    }

    Err(AuthError::UnsupportedKeyFormat)
}

fn parse_der(bytes: &[u8]) -> Option<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(bytes)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(bytes))
        .ok()
}

/// Encrypt with RSA-OAEP(SHA-1)
///
/// # Errors
///
/// Returns `AuthError::EncryptFailed` if the plaintext does not fit the key.
pub fn encrypt_oaep(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, AuthError> {
    key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext)
        .map_err(|e| AuthError::EncryptFailed(e.to_string()))
}
