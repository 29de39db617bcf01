//! Credential encryption using AES-256-GCM
//!
//! Provider connection credentials are stored as one encrypted JSON object.
//! The additional authenticated data binds each ciphertext to its account,
//! provider and connection, so a ciphertext copied onto another row fails to
//! decrypt.

#![allow(deprecated)]

use std::collections::BTreeMap;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::providers::Credentials;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("credential payload is not a JSON object of strings: {0}")]
    InvalidPayload(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ZeroizingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // version || nonce || ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes produced by [`encrypt_bytes`]
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }
    if !is_encrypted_payload(ciphertext) {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];
    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// AAD binding a credential ciphertext to its connection
pub fn credentials_aad(account_id: &Uuid, provider_slug: &str, connection_id: &Uuid) -> String {
    format!("{account_id}|{provider_slug}|{connection_id}")
}

/// Encrypt credential fields as a JSON object
pub fn encrypt_credentials(
    key: &CryptoKey,
    aad: &str,
    fields: &BTreeMap<String, String>,
) -> Result<Vec<u8>, CryptoError> {
    let plaintext = Zeroizing::new(
        serde_json::to_vec(fields).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?,
    );
    encrypt_bytes(key, aad.as_bytes(), &plaintext)
}

/// Decrypt a credential ciphertext into [`Credentials`]
pub fn decrypt_credentials(
    key: &CryptoKey,
    aad: &str,
    ciphertext: &[u8],
) -> Result<Credentials, CryptoError> {
    let plaintext = decrypt_bytes(key, aad.as_bytes(), ciphertext)?;
    let fields: BTreeMap<String, String> = serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::InvalidPayload(e.to_string()))?;
    Ok(Credentials::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad", b"secret message").expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, b"aad", &encrypted).expect("decryption succeeds");
        assert_eq!(decrypted.as_slice(), b"secret message");
    }

    #[test]
    fn test_different_aad_fails() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"aad-1", b"secret").expect("encryption succeeds");
        assert!(decrypt_bytes(&key, b"aad-2", &encrypted).is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        encrypted[13] ^= 0x01;
        assert!(decrypt_bytes(&key, b"aad", &encrypted).is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let first = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        let second = encrypt_bytes(&key, b"aad", b"secret").expect("encryption succeeds");
        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn test_unversioned_payload_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"aad", b"plaintext-password");
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[]),
            Err(CryptoError::EmptyCiphertext)
        ));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_credentials_bound_to_connection() {
        let key = test_key();
        let account = Uuid::new_v4();
        let connection = Uuid::new_v4();
        let fields = BTreeMap::from([
            ("username".to_string(), "svc".to_string()),
            ("password".to_string(), "hunter2".to_string()),
        ]);

        let aad = credentials_aad(&account, "selectel", &connection);
        let ciphertext = encrypt_credentials(&key, &aad, &fields).expect("encryption succeeds");
        let credentials = decrypt_credentials(&key, &aad, &ciphertext).expect("decryption succeeds");
        assert_eq!(credentials.get("password"), Some("hunter2"));

        let other = credentials_aad(&account, "selectel", &Uuid::new_v4());
        assert!(decrypt_credentials(&key, &other, &ciphertext).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = CryptoKey::new(vec![42u8; 32]).expect("valid key");
        assert_eq!(format!("{key:?}"), "CryptoKey([REDACTED])");
    }
}
