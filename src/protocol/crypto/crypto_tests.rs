use base64::Engine as _;

use super::{
    Aes128Cbc, AuthError, RaopRsaPrivateKey, SessionKey, b64, encrypt_oaep, parse_public_key,
};

fn keypair() -> RaopRsaPrivateKey {
    RaopRsaPrivateKey::generate(1024).unwrap()
}

#[test]
fn test_oaep_wrap_pem_roundtrip() {
    let receiver = keypair();
    let pem = receiver.public_key_pem().unwrap();

    let key = parse_public_key(pem.as_bytes()).unwrap();
    let wrapped = encrypt_oaep(&key, &[7u8; 16]).unwrap();

    assert_eq!(wrapped.len(), 128);
    assert_eq!(receiver.decrypt_oaep(&wrapped).unwrap(), vec![7u8; 16]);
}

#[test]
fn test_parse_der_and_stripped_pem() {
    let receiver = keypair();
    let der = receiver.public_key_der().unwrap();
    assert!(parse_public_key(&der).is_ok());

    let stripped: String = receiver
        .public_key_pem()
        .unwrap()
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect();
    assert!(parse_public_key(stripped.as_bytes()).is_ok());
}

#[test]
fn test_parse_raw_modulus() {
    let receiver = keypair();
    let modulus = receiver.modulus();
    assert_eq!(modulus.len(), 128);

    let key = parse_public_key(&modulus).unwrap();
    let wrapped = encrypt_oaep(&key, &[1u8; 16]).unwrap();
    assert_eq!(receiver.decrypt_oaep(&wrapped).unwrap(), vec![1u8; 16]);
}

#[test]
fn test_parse_rejects_short_garbage() {
    assert!(matches!(
        parse_public_key(b"not a key"),
        Err(AuthError::UnsupportedKeyFormat)
    ));
    assert!(matches!(
        parse_public_key(b"-----BEGIN PUBLIC KEY-----\nAAAA\n-----END PUBLIC KEY-----\n"),
        Err(AuthError::UnsupportedKeyFormat)
    ));
}

#[test]
fn test_oaep_fails_on_tiny_modulus() {
    // 32-byte modulus parses but cannot hold an OAEP(SHA-1) block
    let key = parse_public_key(&[0xC3; 32]).unwrap();
    assert!(matches!(
        encrypt_oaep(&key, &[0u8; 16]),
        Err(AuthError::EncryptFailed(_))
    ));
}

#[test]
fn test_cbc_roundtrip_and_padding() {
    let cipher = Aes128Cbc::new(SessionKey::from_slices(&[3u8; 16], &[9u8; 16]).unwrap());

    let plaintext: Vec<u8> = (0..1408u32).map(|i| (i % 251) as u8).collect();
    let ciphertext = cipher.encrypt(&plaintext);

    assert_eq!(ciphertext.len(), 1408 + 16);
    assert_ne!(&ciphertext[..16], &plaintext[..16]);
    assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
}

#[test]
fn test_cbc_is_deterministic_per_packet() {
    let cipher = Aes128Cbc::new(SessionKey::generate().unwrap());
    assert_eq!(cipher.encrypt(b"same"), cipher.encrypt(b"same"));
}

#[test]
fn test_session_key_lengths_checked() {
    assert!(matches!(
        SessionKey::from_slices(&[0u8; 15], &[0u8; 16]),
        Err(AuthError::InvalidKeyLength {
            expected: 16,
            actual: 15
        })
    ));
}

#[test]
fn test_signature_size() {
    let receiver = keypair();
    let signature = receiver.sign_raw(&[0u8; 32]).unwrap();
    assert_eq!(signature.len(), 128);
}

#[test]
fn test_lenient_base64() {
    assert_eq!(b64::RAOP.encode([0xFFu8; 16]).len(), 22);
    assert!(b64::RAOP.decode("AAECAw==").is_ok());
    assert!(b64::RAOP.decode("AAECAw").is_ok());
    assert!(b64::RAOP.decode("!!").is_err());
}
