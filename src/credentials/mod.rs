//! Custody of provider OAuth tokens inside the session.
//!
//! Tokens never reach the session store in plaintext. They are sealed into
//! [`EncryptedRecord`]s by the [`TokenVault`] and opened again per request.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       TokenVault                         │
//! │  - seal / open                           │
//! │  - empty and missing input rejected      │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Encryption Module                  │
//! │  - AES-256-GCM                           │
//! │  - Unique nonces per token               │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Session Store                      │
//! │  - nonce:tag:ciphertext records          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use cost_explorer::credentials::{validate_key, TokenVault};
//!
//! let key = validate_key(&"11".repeat(32)).unwrap();
//! let vault = TokenVault::new(key);
//!
//! let record = vault.seal("dop_v1_access").unwrap();
//! assert_eq!(vault.open(Some(&record)).unwrap(), "dop_v1_access");
//! ```

use std::fmt;

mod encryption;

pub use encryption::{
    decrypt, encrypt, validate_key, CryptoError, EncryptedRecord, TokenKey, KEY_SIZE, NONCE_SIZE,
    TAG_SIZE,
};

/// Plaintext result of a provider token exchange.
///
/// Lives in memory only. Must be sealed before it is written to a session and
/// is never logged; `Debug` redacts both tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthTokenSet {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    pub refresh_token: Option<String>,
}

impl fmt::Debug for OAuthTokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokenSet")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Policy layer over the cipher, bound to the process-wide key.
#[derive(Clone, Debug)]
pub struct TokenVault {
    key: TokenKey,
}

impl TokenVault {
    pub fn new(key: TokenKey) -> Self {
        Self { key }
    }

    /// Seals a token into an at-rest record.
    ///
    /// # Errors
    /// - `EmptyToken` if the token is empty
    pub fn seal(&self, token: &str) -> Result<EncryptedRecord, CryptoError> {
        if token.is_empty() {
            return Err(CryptoError::EmptyToken);
        }
        encrypt(token, self.key.as_bytes())
    }

    /// Opens a record sealed by this vault.
    ///
    /// # Errors
    /// - `MissingRecord` if there is nothing to open
    /// - `MalformedRecord` / `AuthenticationFailed` from the cipher, unchanged
    pub fn open(&self, record: Option<&EncryptedRecord>) -> Result<String, CryptoError> {
        let record = record.ok_or(CryptoError::MissingRecord)?;
        decrypt(record, self.key.as_bytes())
    }
}
