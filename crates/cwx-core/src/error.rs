use cwx_crypto::CryptoError;
use thiserror::Error;

pub type CwxResult<T> = Result<T, CwxError>;

#[derive(Debug, Error)]
pub enum CwxError {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CwxError {
    /// Message safe to show an end user. Crypto failures collapse to what the
    /// user can act on; nothing internal (keys, nonces, cost values) leaks.
    pub fn user_message(&self) -> &'static str {
        match self {
            CwxError::Crypto(e) if e.is_wrong_password() => "incorrect file password",
            CwxError::Crypto(CryptoError::CorruptOrTampered) => {
                "file is corrupted or has been tampered with"
            }
            CwxError::Crypto(CryptoError::MalformedHash) => "stored credentials are unreadable",
            CwxError::Config(_) => "invalid configuration",
            _ => "internal error",
        }
    }
}
