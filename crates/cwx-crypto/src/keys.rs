//! Key hierarchy: DEK/KEK generation and layered key wrapping
//!
//! ```text
//! DEK --wrap_dek(KEK)--> WrappedKey   (stored with the file)
//! KEK --wrap_kek(PEK)--> WrappedKey   (stored with the user)
//! ```
//!
//! The typed helpers only accept the next layer up, so a DEK can never be
//! wrapped directly under a PEK and a raw key never leaves this module
//! unwrapped except through `as_bytes`.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::aead::{self, Nonce};
use crate::error::{CryptoError, Result};
use crate::kdf::Pek;
use crate::{KEY_SIZE, TAG_SIZE};

macro_rules! symmetric_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            bytes: [u8; KEY_SIZE],
        }

        impl $name {
            pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self { bytes }
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.bytes
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.bytes.zeroize();
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("bytes", &"[REDACTED]")
                    .finish()
            }
        }
    };
}

symmetric_key!(
    /// A per-file 256-bit data encryption key. Generated per upload, persisted
    /// only in wrapped form. Zeroized on drop.
    Dek
);

symmetric_key!(
    /// A per-user 256-bit key encryption key. Generated once at registration,
    /// persisted only wrapped under the PEK, held in memory only for the
    /// duration of one upload/download. Zeroized on drop.
    Kek
);

/// One key encrypted under another: `ciphertext` is the 32-byte key plus the
/// 16-byte GCM tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce,
}

fn random_key() -> Result<[u8; KEY_SIZE]> {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().try_fill_bytes(&mut bytes)?;
    Ok(bytes)
}

/// Generate a random 256-bit DEK.
pub fn generate_dek() -> Result<Dek> {
    Ok(Dek::from_bytes(random_key()?))
}

/// Generate a random 256-bit KEK. Registration only.
pub fn generate_kek() -> Result<Kek> {
    Ok(Kek::from_bytes(random_key()?))
}

/// Wrap (encrypt) `plain_key` under `wrapping_key` with a fresh random nonce.
pub fn wrap_key(plain_key: &[u8; KEY_SIZE], wrapping_key: &[u8; KEY_SIZE]) -> Result<WrappedKey> {
    let nonce = Nonce::generate()?;
    let ciphertext = aead::encrypt(wrapping_key, &nonce, plain_key)?;
    Ok(WrappedKey { ciphertext, nonce })
}

/// Unwrap (decrypt) a key. Fails with [`CryptoError::AuthenticationFailure`]
/// when `wrapping_key` is wrong or the wrapped bytes were modified.
pub fn unwrap_key(
    wrapped: &WrappedKey,
    wrapping_key: &[u8; KEY_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    if wrapped.ciphertext.len() != KEY_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "wrapped key must be {} bytes, got {}",
            KEY_SIZE + TAG_SIZE,
            wrapped.ciphertext.len()
        )));
    }

    let mut plaintext = aead::decrypt(wrapping_key, &wrapped.nonce, &wrapped.ciphertext)?;

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&plaintext);
    plaintext.zeroize();
    Ok(key)
}

/// Wrap a DEK under the user's KEK.
pub fn wrap_dek(dek: &Dek, kek: &Kek) -> Result<WrappedKey> {
    wrap_key(dek.as_bytes(), kek.as_bytes())
}

/// Unwrap a DEK with the user's KEK.
pub fn unwrap_dek(wrapped: &WrappedKey, kek: &Kek) -> Result<Dek> {
    let bytes = unwrap_key(wrapped, kek.as_bytes())?;
    Ok(Dek::from_bytes(*bytes))
}

/// Wrap the KEK under a password-derived key.
pub fn wrap_kek(kek: &Kek, pek: &Pek) -> Result<WrappedKey> {
    wrap_key(kek.as_bytes(), pek.as_bytes())
}

/// Unwrap the KEK with a password-derived key. A tag mismatch here means the
/// file password was wrong and surfaces as [`CryptoError::WrongPassword`].
pub fn unwrap_kek(wrapped: &WrappedKey, pek: &Pek) -> Result<Kek> {
    match unwrap_key(wrapped, pek.as_bytes()) {
        Ok(bytes) => Ok(Kek::from_bytes(*bytes)),
        Err(CryptoError::AuthenticationFailure) => Err(CryptoError::WrongPassword),
        Err(e) => Err(e),
    }
}
