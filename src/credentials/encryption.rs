//! AES-256-GCM encryption for session tokens.
//!
//! Each token is encrypted separately with a fresh random nonce. The at-rest
//! form is `nonce:tag:ciphertext`, each part lowercase hex.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors raised while sealing or opening token records.
///
/// Display strings never carry key material or plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// Key is not exactly 32 bytes
    InvalidKey,
    /// Plaintext handed to the cipher is empty
    EmptyInput,
    /// Token handed to the vault is empty
    EmptyToken,
    /// No record to open
    MissingRecord,
    /// Record does not split into nonce, tag and ciphertext
    MalformedRecord,
    /// Tag did not verify (corrupted, tampered, or wrong key)
    AuthenticationFailed,
    /// Cipher refused the plaintext (beyond the GCM length limit)
    EncryptionFailed,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKey => write!(f, "Token key must be {} bytes", KEY_SIZE),
            CryptoError::EmptyInput => write!(f, "Plaintext to encrypt cannot be empty"),
            CryptoError::EmptyToken => write!(f, "Token to seal cannot be empty"),
            CryptoError::MissingRecord => write!(f, "No encrypted record present"),
            CryptoError::MalformedRecord => write!(f, "Encrypted record is malformed"),
            CryptoError::AuthenticationFailed => write!(f, "Encrypted record failed authentication"),
            CryptoError::EncryptionFailed => write!(f, "Plaintext could not be encrypted"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// The 256-bit key protecting tokens at rest.
///
/// Loaded once at startup and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenKey([u8; KEY_SIZE]);

impl TokenKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for TokenKey {
    type Error = CryptoError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenKey(<redacted>)")
    }
}

/// Validates that the key is 64 hex characters (32 bytes).
///
/// # Returns
/// * `Ok(TokenKey)` - Decoded key
/// * `Err(CryptoError::InvalidKey)` - Wrong length or not hex
pub fn validate_key(key_hex: &str) -> Result<TokenKey, CryptoError> {
    let bytes = hex::decode(key_hex.trim()).map_err(|_| CryptoError::InvalidKey)?;
    TokenKey::try_from(bytes.as_slice())
}

/// At-rest representation of one sealed token.
///
/// The three parts always travel together; a record is replaced wholesale,
/// never edited.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedRecord(String);

impl EncryptedRecord {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_parts(nonce: &[u8], tag: &[u8], ciphertext: &[u8]) -> Self {
        Self(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    fn parts(&self) -> Result<RecordParts, CryptoError> {
        let mut fields = self.0.split(':');
        let (nonce, tag, ciphertext) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(n), Some(t), Some(c), None) => (n, t, c),
            _ => return Err(CryptoError::MalformedRecord),
        };

        let nonce = hex::decode(nonce).map_err(|_| CryptoError::MalformedRecord)?;
        let tag = hex::decode(tag).map_err(|_| CryptoError::MalformedRecord)?;
        let ciphertext = hex::decode(ciphertext).map_err(|_| CryptoError::MalformedRecord)?;

        if nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
            return Err(CryptoError::MalformedRecord);
        }

        Ok(RecordParts {
            nonce,
            tag,
            ciphertext,
        })
    }
}

impl From<String> for EncryptedRecord {
    fn from(stored: String) -> Self {
        Self(stored)
    }
}

impl fmt::Debug for EncryptedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Ciphertext is safe to show but noisy; length is enough for diagnostics
        write!(f, "EncryptedRecord(len={})", self.0.len())
    }
}

struct RecordParts {
    nonce: Vec<u8>,
    tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey);
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)
}

/// Encrypts plaintext using AES-256-GCM with a random nonce.
///
/// # Security
/// - Draws a fresh 12-byte nonce from the OS CSPRNG on every call (never reuse)
/// - Authenticated encryption (tampering detected on decrypt)
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<EncryptedRecord, CryptoError> {
    let cipher = cipher_for(key)?;

    if plaintext.is_empty() {
        return Err(CryptoError::EmptyInput);
    }

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // aes-gcm appends the tag to the ciphertext
    let mut sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;
    let tag = sealed.split_off(sealed.len() - TAG_SIZE);

    Ok(EncryptedRecord::from_parts(&nonce, &tag, &sealed))
}

/// Decrypts a record produced by [`encrypt`] under the same key.
///
/// The tag is verified before any plaintext is produced. Corruption and
/// tampering both surface as `AuthenticationFailed`.
pub fn decrypt(record: &EncryptedRecord, key: &[u8]) -> Result<String, CryptoError> {
    let cipher = cipher_for(key)?;
    let RecordParts {
        nonce,
        tag,
        mut ciphertext,
    } = record.parts()?;

    ciphertext.extend_from_slice(&tag);

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedRecord)
}
