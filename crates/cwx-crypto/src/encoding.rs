//! Base64 helpers for binary fields crossing the wire.
//!
//! All binary values exchanged with the backend use standard, padded base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::Result;

pub fn encode(data: impl AsRef<[u8]>) -> String {
    STANDARD.encode(data)
}

pub fn decode(s: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(s.trim())?)
}

/// `#[serde(with = "crate::encoding::base64_bytes")]` for `Vec<u8>` fields
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ignores_surrounding_whitespace() {
        assert_eq!(decode(" aGVsbG8=\n").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_invalid() {
        assert!(decode("not base64!!").is_err());
    }
}
