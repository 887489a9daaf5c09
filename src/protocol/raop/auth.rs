//! RAOP challenge-response and key exchange

use std::net::IpAddr;

use base64::Engine as _;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};

use crate::protocol::crypto::{
    Aes128Cbc, AuthError, RaopRsaPrivateKey, SessionKey, b64, encrypt_oaep, lengths,
    parse_public_key, rsa_sizes,
};

/// Authentication and payload-encryption capability used by a session
///
/// Lets the session run against any crypto backend.
pub trait KeyExchange: Send {
    /// Generate the sender keypair; idempotent after success
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeygenFailed` if the RSA backend fails.
    fn initialize(&mut self) -> Result<(), AuthError>;

    /// Receiver password for the coming handshake, `None` to clear it
    ///
    /// Called before every handshake. The default ignores it.
    fn set_password(&mut self, _password: Option<String>) {}

    /// Whether `initialize` has succeeded
    fn is_initialized(&self) -> bool;

    /// Fresh `Apple-Challenge` value, retained for the session
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RandomSourceFailed` if secure randomness is unavailable.
    fn generate_challenge(&mut self) -> Result<String, AuthError>;

    /// Check an `Apple-Response` header value
    fn verify_response(&self, response: &str, client_ip: IpAddr, server_ip: IpAddr) -> bool;

    /// Sender public key as bare base64 SPKI
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotInitialized` before `initialize`.
    fn public_key_pem(&self) -> Result<String, AuthError>;

    /// Draw a session AES key and IV
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RandomSourceFailed` on entropy failure.
    fn derive_session_key(&mut self) -> Result<SessionKey, AuthError>;

    /// Wrap an AES key under the receiver's RSA public key
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedKeyFormat` or `EncryptFailed`.
    fn wrap_session_key(
        &self,
        aes_key: &[u8],
        server_public_key: &[u8],
    ) -> Result<Vec<u8>, AuthError>;

    /// Turn on payload encryption under `key`
    fn enable_encryption(&mut self, key: SessionKey);

    /// Whether payloads are being encrypted
    fn is_encryption_enabled(&self) -> bool;

    /// Encrypt an audio payload, or return it unchanged when encryption is off
    fn encrypt_payload(&self, plaintext: &[u8]) -> Vec<u8>;

    /// Drop session key material and stop encrypting
    fn reset_session(&mut self);
}

/// RSA/AES implementation of [`KeyExchange`]
#[derive(Default)]
pub struct AirPlayAuth {
    keypair: Option<RaopRsaPrivateKey>,
    challenge: Option<[u8; lengths::CHALLENGE]>,
    cipher: Option<Aes128Cbc>,
    password: Option<String>,
}

impl AirPlayAuth {
    /// Create an uninitialized authenticator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Challenge bytes from the last `generate_challenge`
    #[must_use]
    pub fn challenge(&self) -> Option<&[u8]> {
        self.challenge
            .as_ref()
            .map(<[u8; lengths::CHALLENGE]>::as_slice)
    }

    /// Password of the receiver being connected to
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl KeyExchange for AirPlayAuth {
    fn initialize(&mut self) -> Result<(), AuthError> {
        if self.keypair.is_none() {
            self.keypair = Some(RaopRsaPrivateKey::generate(rsa_sizes::CLIENT_MODULUS_BITS)?);
            debug!(
                "generated {}-bit sender keypair",
                rsa_sizes::CLIENT_MODULUS_BITS
            );
        }
        Ok(())
    }

    fn set_password(&mut self, password: Option<String>) {
        self.password = password;
    }

    fn is_initialized(&self) -> bool {
        self.keypair.is_some()
    }

    fn generate_challenge(&mut self) -> Result<String, AuthError> {
        let mut challenge = [0u8; lengths::CHALLENGE];
        OsRng
            .try_fill_bytes(&mut challenge)
            .map_err(|_| AuthError::RandomSourceFailed)?;
        self.challenge = Some(challenge);
        Ok(b64::RAOP.encode(challenge))
    }

    fn verify_response(&self, response: &str, _client_ip: IpAddr, _server_ip: IpAddr) -> bool {
        // No receiver signing key is available to the sender: any decodable,
        // non-empty value is accepted.
        let response = response.trim();
        if response.is_empty() {
            return false;
        }
        match b64::RAOP.decode(response) {
            Ok(bytes) => !bytes.is_empty(),
            Err(e) => {
                warn!("malformed Apple-Response: {e}");
                false
            }
        }
    }

    fn public_key_pem(&self) -> Result<String, AuthError> {
        let pem = self
            .keypair
            .as_ref()
            .ok_or(AuthError::NotInitialized)?
            .public_key_pem()?;
        Ok(pem
            .lines()
            .filter(|line| !line.starts_with("-----"))
            .collect())
    }

    fn derive_session_key(&mut self) -> Result<SessionKey, AuthError> {
        SessionKey::generate()
    }

    fn wrap_session_key(
        &self,
        aes_key: &[u8],
        server_public_key: &[u8],
    ) -> Result<Vec<u8>, AuthError> {
        let key = parse_public_key(server_public_key)?;
        encrypt_oaep(&key, aes_key)
    }

    fn enable_encryption(&mut self, key: SessionKey) {
        self.cipher = Some(Aes128Cbc::new(key));
    }

    fn is_encryption_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    fn encrypt_payload(&self, plaintext: &[u8]) -> Vec<u8> {
        match &self.cipher {
            Some(cipher) => cipher.encrypt(plaintext),
            None => plaintext.to_vec(),
        }
    }

    fn reset_session(&mut self) {
        self.cipher = None;
        self.challenge = None;
    }
}

/// Message a receiver signs for `Apple-Response`
///
/// challenge || ip octets || hardware address, zero padded to 32 bytes.
#[must_use]
pub fn build_response_message(challenge: &[u8], ip: IpAddr, hw_addr: &[u8; 6]) -> Vec<u8> {
    let mut message = Vec::with_capacity(38);
    message.extend_from_slice(challenge);
    match ip {
        IpAddr::V4(addr) => message.extend_from_slice(&addr.octets()),
        IpAddr::V6(addr) => message.extend_from_slice(&addr.octets()),
    }
    message.extend_from_slice(hw_addr);
    if message.len() < 32 {
        message.resize(32, 0);
    }
    message
}
