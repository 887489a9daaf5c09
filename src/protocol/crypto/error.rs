use thiserror::Error;

/// Key exchange and payload crypto errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("RSA key generation failed: {0}")]
    KeygenFailed(String),

    #[error("secure random source unavailable")]
    RandomSourceFailed,

    #[error("server public key is not PEM, DER or a raw modulus")]
    UnsupportedKeyFormat,

    #[error("RSA-OAEP encryption failed: {0}")]
    EncryptFailed(String),

    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    #[error("key exchange not initialized")]
    NotInitialized,

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
