//! Request/response bodies exchanged with the backend API
//!
//! Binary fields are base64, cost parameters are plain integers. Field names
//! follow the backend contract (`encrypted_KEK`, `iv_KEK`, `p`/`m`/`t`, ...).

use serde::{Deserialize, Serialize};

use crate::aead::Nonce;
use crate::envelope::FileEnvelope;
use crate::error::Result;
use crate::kdf::{DerivationParams, KdfCost};
use crate::keys::WrappedKey;

/// A user's KEK as stored by the backend: wrapped under the PEK, with the
/// salt and cost needed to re-derive that PEK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KekRecord {
    #[serde(rename = "encrypted_KEK", with = "crate::encoding::base64_bytes")]
    pub encrypted_kek: Vec<u8>,
    #[serde(rename = "iv_KEK")]
    pub iv_kek: Nonce,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub salt: Vec<u8>,
    /// Parallelism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<u32>,
    /// Memory cost (KiB)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u32>,
    /// Time cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<u32>,
    /// Set by the backend; opaque to the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kek_created_at: Option<String>,
}

impl KekRecord {
    pub fn new(wrapped: WrappedKey, params: DerivationParams) -> Self {
        Self {
            encrypted_kek: wrapped.ciphertext,
            iv_kek: wrapped.nonce,
            salt: params.salt,
            p: Some(params.cost.parallelism),
            m: Some(params.cost.mem_cost_kib),
            t: Some(params.cost.time_cost),
            kek_created_at: None,
        }
    }

    pub fn wrapped_kek(&self) -> WrappedKey {
        WrappedKey {
            ciphertext: self.encrypted_kek.clone(),
            nonce: self.iv_kek,
        }
    }

    /// The parameters the PEK was derived with. Records written before cost
    /// bookkeeping carry no p/m/t; those fall back to `fallback` per field.
    pub fn derivation_params(&self, fallback: &KdfCost) -> DerivationParams {
        DerivationParams {
            salt: self.salt.clone(),
            cost: KdfCost {
                mem_cost_kib: self.m.unwrap_or(fallback.mem_cost_kib),
                time_cost: self.t.unwrap_or(fallback.time_cost),
                parallelism: self.p.unwrap_or(fallback.parallelism),
            },
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Body of the registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayload {
    pub username: String,
    /// PHC-encoded login hash; the raw login password never leaves the client
    pub auth_password: String,
    pub email: String,
    /// Base64 SPKI Ed25519 public key, armor stripped
    pub public_key: String,
    #[serde(flatten)]
    pub kek: KekRecord,
}

impl RegistrationPayload {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Body returned when retrieving one file: the owner's KEK record next to the
/// file envelope, flattened into a single object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadPayload {
    #[serde(flatten)]
    pub kek: KekRecord,
    #[serde(flatten)]
    pub file: FileEnvelope,
}

impl DownloadPayload {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::seal;
    use crate::kdf::test_cost;
    use crate::keys::{generate_dek, generate_kek, wrap_dek, wrap_key};

    fn sample_record() -> KekRecord {
        let wrapped = wrap_key(generate_kek().unwrap().as_bytes(), &[9u8; 32]).unwrap();
        KekRecord::new(wrapped, DerivationParams::generate(test_cost()).unwrap())
    }

    #[test]
    fn test_kek_record_field_names() {
        let record = sample_record();
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();

        assert!(value["encrypted_KEK"].is_string());
        assert!(value["iv_KEK"].is_string());
        assert!(value["salt"].is_string());
        assert_eq!(value["m"], 1024);
        assert_eq!(value["t"], 1);
        assert_eq!(value["p"], 1);
        assert!(value.get("kek_created_at").is_none());
    }

    #[test]
    fn test_kek_record_roundtrip_preserves_wrap() {
        let record = sample_record();
        let back = KekRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.wrapped_kek(), record.wrapped_kek());
    }

    #[test]
    fn test_derivation_params_fallback() {
        let mut record = sample_record();
        record.m = None;
        record.t = None;

        let fallback = KdfCost::default();
        let params = record.derivation_params(&fallback);
        assert_eq!(params.salt, record.salt);
        assert_eq!(params.cost.mem_cost_kib, fallback.mem_cost_kib);
        assert_eq!(params.cost.time_cost, fallback.time_cost);
        assert_eq!(params.cost.parallelism, 1, "stored value wins");
    }

    #[test]
    fn test_retrieval_record_with_timestamp() {
        let json = r#"{
            "encrypted_KEK": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "iv_KEK": "AAAAAAAAAAAAAAAA",
            "salt": "c2FsdHNhbHRzYWx0c2FsdA==",
            "kek_created_at": "2025-03-14T09:26:53Z"
        }"#;
        let record = KekRecord::from_json(json).unwrap();
        assert_eq!(record.encrypted_kek.len(), 48);
        assert_eq!(record.kek_created_at.as_deref(), Some("2025-03-14T09:26:53Z"));
        assert!(record.p.is_none());
    }

    #[test]
    fn test_registration_payload_is_flat() {
        let payload = RegistrationPayload {
            username: "alice".into(),
            auth_password: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".into(),
            email: "alice@example.com".into(),
            public_key: "MCowBQYDK2VwAyEA".into(),
            kek: sample_record(),
        };
        let value: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(value["username"], "alice");
        assert!(value["encrypted_KEK"].is_string());
        assert!(value.get("kek").is_none());

        // A registration body also reads back as a plain KEK record
        let record = KekRecord::from_json(&payload.to_json().unwrap()).unwrap();
        assert_eq!(record, payload.kek);
        assert_eq!(RegistrationPayload::from_json(&payload.to_json().unwrap()).unwrap(), payload);
    }

    #[test]
    fn test_download_payload_roundtrip() {
        let dek = generate_dek().unwrap();
        let sealed = seal(b"\x00\xff\x00binary", "blob.bin", "application/octet-stream", &dek)
            .unwrap();
        let wrapped = wrap_dek(&dek, &generate_kek().unwrap()).unwrap();
        let payload = DownloadPayload {
            kek: sample_record(),
            file: FileEnvelope::new(sealed, wrapped),
        };

        let json = payload.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["encrypted_KEK"].is_string());
        assert!(value["encrypted_file"].is_string());

        assert_eq!(DownloadPayload::from_json(&json).unwrap(), payload);
    }
}
