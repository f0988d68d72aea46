//! Error types for the cwx-crypto crate
//!
//! Messages name what went wrong, never the values involved: no key bytes,
//! nonces, salts or cost parameters ever end up in error text.

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag did not verify: wrong key, wrong nonce, or modified ciphertext.
    /// The three causes are indistinguishable.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The KEK could not be unwrapped under the PEK derived from the entered
    /// file password.
    #[error("wrong password")]
    WrongPassword,

    /// A file payload failed verification. Nothing is returned in that case.
    #[error("file payload is corrupt or has been tampered with")]
    CorruptOrTampered,

    /// Derivation cost settings out of bounds. Carries the offending field name.
    #[error("invalid derivation parameters: {0}")]
    InvalidParameters(String),

    /// A stored authentication hash does not match the canonical PHC encoding
    #[error("malformed password hash")]
    MalformedHash,

    /// Key material of the wrong length or shape
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Nonce of the wrong length
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Base64 / JSON / header decoding failure
    #[error("encoding error: {0}")]
    Encoding(String),

    /// CSPRNG or key-pair generation failure
    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

impl CryptoError {
    /// True for the failures caused by the user's password (or by data that
    /// cannot be told apart from a wrong password).
    pub fn is_wrong_password(&self) -> bool {
        matches!(self, Self::WrongPassword | Self::AuthenticationFailure)
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Encoding(format!("base64: {e}"))
    }
}

impl From<rand::Error> for CryptoError {
    fn from(e: rand::Error) -> Self {
        Self::KeyGeneration(format!("CSPRNG: {e}"))
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(format!("json: {e}"))
    }
}
