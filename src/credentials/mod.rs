//! Per-user provider credentials.
//!
//! Keys are stored encrypted (AES-GCM ciphertext with its IV and
//! authentication tag) and only turned into a plaintext [`Credential`] by an
//! external key service at the moment a provider call is made.
//!
//! [`Credential`]: crate::llm::provider::Credential

mod unwrap;

pub use unwrap::{HttpKeyUnwrapper, UNWRAP_TOKEN_ENV};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::llm::provider::Credential;

/// Expected IV length in bytes (96-bit GCM nonce).
pub const IV_LEN: usize = 12;
/// Expected authentication tag length in bytes.
pub const AUTH_TAG_LEN: usize = 16;

/// Errors that can occur while resolving a credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Stored record is not valid base64 or has wrong field lengths.
    #[error("malformed credential record: {0}")]
    Malformed(String),

    /// Key service unreachable or returned a non-success status.
    #[error("key unwrap failed: {0}")]
    Unwrap(String),
}

/// An encrypted provider key as persisted in the store. Fields are base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
}

impl EncryptedCredential {
    /// Encode raw bytes into a storable record.
    pub fn from_parts(ciphertext: &[u8], iv: &[u8], auth_tag: &[u8]) -> Self {
        Self {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(iv),
            auth_tag: BASE64.encode(auth_tag),
        }
    }

    /// Check that every field decodes and the IV and tag have GCM lengths.
    pub fn validate(&self) -> Result<(), CredentialError> {
        let ciphertext = decode("ciphertext", &self.ciphertext)?;
        if ciphertext.is_empty() {
            return Err(CredentialError::Malformed("ciphertext is empty".to_owned()));
        }
        expect_len("iv", &decode("iv", &self.iv)?, IV_LEN)?;
        expect_len("auth_tag", &decode("auth_tag", &self.auth_tag)?, AUTH_TAG_LEN)?;
        Ok(())
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, CredentialError> {
    BASE64
        .decode(value)
        .map_err(|e| CredentialError::Malformed(format!("{field}: {e}")))
}

fn expect_len(field: &str, bytes: &[u8], len: usize) -> Result<(), CredentialError> {
    if bytes.len() != len {
        return Err(CredentialError::Malformed(format!(
            "{field} must be {len} bytes (got {})",
            bytes.len()
        )));
    }
    Ok(())
}

/// Turns an [`EncryptedCredential`] into a usable key.
#[async_trait]
pub trait KeyUnwrapper: Send + Sync {
    async fn unwrap_key(&self, record: &EncryptedCredential) -> Result<Credential, CredentialError>;
}
