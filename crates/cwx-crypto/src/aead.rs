//! AES-256-GCM encryption/decryption
//!
//! Ciphertext format (binary):
//! ```text
//! [N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The nonce travels separately (`iv_*` fields / `X-IV-*` headers). It is
//! never derived from key material or identifiers: every call to [`encrypt`]
//! must be given a nonce from [`Nonce::generate`].

use aes_gcm::{
    aead::{Aead, AeadInPlace, KeyInit},
    Aes256Gcm, Tag,
};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::encoding;
use crate::error::{CryptoError, Result};
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// A 96-bit AES-GCM nonce. Serialized as base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Draw a fresh random nonce from the thread-local CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().try_fill_bytes(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidNonce(format!(
                "expected {NONCE_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encoding::encode(self.0)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        Self::from_slice(&encoding::decode(s)?)
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({})", self.to_base64())
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// Split a wire ciphertext into `(body, tag)`; the tag is always the last
/// [`TAG_SIZE`] bytes. Returns `None` when the input is too short to hold one.
pub fn split_tag(ciphertext: &[u8]) -> Option<(&[u8], &[u8])> {
    if ciphertext.len() < TAG_SIZE {
        return None;
    }
    Some(ciphertext.split_at(ciphertext.len() - TAG_SIZE))
}

/// Encrypt `plaintext` under `key` with AES-256-GCM.
///
/// Returns `ciphertext || tag`, exactly `plaintext.len() + 16` bytes.
pub fn encrypt(key: &[u8; KEY_SIZE], nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());
    cipher
        .encrypt(nonce.as_bytes().into(), plaintext)
        .map_err(|_| CryptoError::Encoding("plaintext too large for AES-GCM".into()))
}

/// Decrypt `ciphertext || tag` under `key`.
///
/// Fails with [`CryptoError::AuthenticationFailure`] if the tag does not verify.
/// No plaintext is released on failure.
pub fn decrypt(key: &[u8; KEY_SIZE], nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let (body, tag) = split_tag(ciphertext).ok_or(CryptoError::AuthenticationFailure)?;
    let cipher = Aes256Gcm::new(key.into());

    let mut buffer = body.to_vec();
    match cipher.decrypt_in_place_detached(
        nonce.as_bytes().into(),
        b"",
        &mut buffer,
        Tag::from_slice(tag),
    ) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            zeroize::Zeroize::zeroize(&mut buffer);
            Err(CryptoError::AuthenticationFailure)
        }
    }
}
