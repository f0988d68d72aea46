//! File envelope: sealed payload + metadata + wrapped DEK
//!
//! JSON form (download / stored record), binary fields base64:
//! ```text
//! { "file_name", "file_type", "file_size",
//!   "encrypted_file", "iv_file", "encrypted_dek", "iv_dek" }
//! ```
//!
//! Upload form: raw `encrypted_file` body plus the `X-IV-File`, `X-File-Type`,
//! `X-File-Size`, `X-IV-DEK` and `X-Encrypted-DEK` headers.

use serde::{Deserialize, Serialize};

use crate::aead::{self, Nonce};
use crate::encoding;
use crate::error::{CryptoError, Result};
use crate::keys::{Dek, WrappedKey};
use crate::TAG_SIZE;

pub const HEADER_IV_FILE: &str = "X-IV-File";
pub const HEADER_FILE_TYPE: &str = "X-File-Type";
pub const HEADER_FILE_SIZE: &str = "X-File-Size";
pub const HEADER_IV_DEK: &str = "X-IV-DEK";
pub const HEADER_ENCRYPTED_DEK: &str = "X-Encrypted-DEK";

/// Output of [`seal`]: the file metadata, its ciphertext (with tag) and the
/// nonce used. Becomes a [`FileEnvelope`] once the DEK is wrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFile {
    pub file_name: String,
    pub file_type: String,
    /// Plaintext size in bytes
    pub file_size: u64,
    pub encrypted_file: Vec<u8>,
    pub file_nonce: Nonce,
}

/// Encrypt raw file bytes under the DEK with a fresh nonce.
pub fn seal(file_bytes: &[u8], file_name: &str, file_type: &str, dek: &Dek) -> Result<SealedFile> {
    let file_nonce = Nonce::generate()?;
    let encrypted_file = aead::encrypt(dek.as_bytes(), &file_nonce, file_bytes)?;
    Ok(SealedFile {
        file_name: file_name.to_string(),
        file_type: file_type.to_string(),
        file_size: file_bytes.len() as u64,
        encrypted_file,
        file_nonce,
    })
}

/// Decrypt a file payload. Fails with [`CryptoError::CorruptOrTampered`] if
/// the tag does not verify or the plaintext length disagrees with the
/// declared size; nothing is returned in either case.
pub fn open(envelope: &FileEnvelope, dek: &Dek) -> Result<Vec<u8>> {
    let plaintext = aead::decrypt(dek.as_bytes(), &envelope.file_nonce, &envelope.encrypted_file)
        .map_err(|e| match e {
            CryptoError::AuthenticationFailure => CryptoError::CorruptOrTampered,
            other => other,
        })?;

    if plaintext.len() as u64 != envelope.file_size {
        return Err(CryptoError::CorruptOrTampered);
    }
    Ok(plaintext)
}

/// Everything stored for one encrypted file. The KEK that wraps `wrapped_dek`
/// is implied by the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "EnvelopeWire", try_from = "EnvelopeWire")]
pub struct FileEnvelope {
    pub file_name: String,
    pub file_type: String,
    /// Plaintext size in bytes
    pub file_size: u64,
    pub encrypted_file: Vec<u8>,
    pub file_nonce: Nonce,
    pub wrapped_dek: WrappedKey,
}

impl FileEnvelope {
    pub fn new(sealed: SealedFile, wrapped_dek: WrappedKey) -> Self {
        Self {
            file_name: sealed.file_name,
            file_type: sealed.file_type,
            file_size: sealed.file_size,
            encrypted_file: sealed.encrypted_file,
            file_nonce: sealed.file_nonce,
            wrapped_dek,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Headers accompanying the raw `encrypted_file` upload body.
    pub fn upload_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_IV_FILE, self.file_nonce.to_base64()),
            (HEADER_FILE_TYPE, self.file_type.clone()),
            (HEADER_FILE_SIZE, self.file_size.to_string()),
            (HEADER_IV_DEK, self.wrapped_dek.nonce.to_base64()),
            (HEADER_ENCRYPTED_DEK, encoding::encode(&self.wrapped_dek.ciphertext)),
        ]
    }

    /// Reassemble an envelope from an upload. Header names match
    /// case-insensitively.
    pub fn from_upload<K, V>(
        file_name: impl Into<String>,
        headers: impl IntoIterator<Item = (K, V)>,
        body: Vec<u8>,
    ) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let headers: Vec<(K, V)> = headers.into_iter().collect();
        let get = |name: &str| header(&headers, name);

        let file_size: u64 = get(HEADER_FILE_SIZE)?
            .parse()
            .map_err(|_| {
                CryptoError::Encoding(format!("{HEADER_FILE_SIZE} is not a decimal integer"))
            })?;
        if file_size.checked_add(TAG_SIZE as u64) != Some(body.len() as u64) {
            return Err(CryptoError::Encoding(format!(
                "body length does not match {HEADER_FILE_SIZE}"
            )));
        }

        Ok(Self {
            file_name: file_name.into(),
            file_type: get(HEADER_FILE_TYPE)?.to_string(),
            file_size,
            encrypted_file: body,
            file_nonce: Nonce::from_base64(get(HEADER_IV_FILE)?)?,
            wrapped_dek: WrappedKey {
                ciphertext: encoding::decode(get(HEADER_ENCRYPTED_DEK)?)?,
                nonce: Nonce::from_base64(get(HEADER_IV_DEK)?)?,
            },
        })
    }
}

fn header<'a, K: AsRef<str>, V: AsRef<str>>(headers: &'a [(K, V)], name: &str) -> Result<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.as_ref().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_ref().trim())
        .ok_or_else(|| CryptoError::Encoding(format!("missing header {name}")))
}

#[derive(Serialize, Deserialize)]
struct EnvelopeWire {
    file_name: String,
    file_type: String,
    file_size: u64,
    encrypted_file: String,
    iv_file: String,
    encrypted_dek: String,
    iv_dek: String,
}

impl From<FileEnvelope> for EnvelopeWire {
    fn from(e: FileEnvelope) -> Self {
        Self {
            iv_file: e.file_nonce.to_base64(),
            encrypted_file: encoding::encode(&e.encrypted_file),
            iv_dek: e.wrapped_dek.nonce.to_base64(),
            encrypted_dek: encoding::encode(&e.wrapped_dek.ciphertext),
            file_name: e.file_name,
            file_type: e.file_type,
            file_size: e.file_size,
        }
    }
}

impl TryFrom<EnvelopeWire> for FileEnvelope {
    type Error = CryptoError;

    fn try_from(w: EnvelopeWire) -> Result<Self> {
        Ok(Self {
            file_name: w.file_name,
            file_type: w.file_type,
            file_size: w.file_size,
            encrypted_file: encoding::decode(&w.encrypted_file)?,
            file_nonce: Nonce::from_base64(&w.iv_file)?,
            wrapped_dek: WrappedKey {
                ciphertext: encoding::decode(&w.encrypted_dek)?,
                nonce: Nonce::from_base64(&w.iv_dek)?,
            },
        })
    }
}
