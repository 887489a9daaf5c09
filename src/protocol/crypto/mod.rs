//! Cryptographic primitives for RAOP key exchange and payload encryption

mod aes;
mod error;
mod rsa;

#[cfg(test)]
mod crypto_tests;

pub use self::aes::{Aes128Cbc, SessionKey};
pub use self::error::AuthError;
pub use self::rsa::{RaopRsaPrivateKey, encrypt_oaep, parse_public_key, sizes as rsa_sizes};

/// Length of various cryptographic values
pub mod lengths {
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES block / IV length
    pub const AES_IV: usize = 16;
    /// Apple-Challenge length
    pub const CHALLENGE: usize = 16;
}

/// Base64 engines used on the wire
pub mod b64 {
    use base64::alphabet;
    use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

    /// Standard alphabet, no padding on encode, padding optional on decode
    pub const RAOP: GeneralPurpose = GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent),
    );
}
