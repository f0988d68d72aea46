//! cwx-crypto: Client-side envelope encryption for CloudWorx
//!
//! Architecture: layered key wrapping with AES-256-GCM
//!
//! Key hierarchy:
//! ```text
//! File password
//!   └── PEK (256-bit, Argon2id from file password + stored salt/cost, never stored)
//!         └── KEK (per-user, 256-bit random, stored only wrapped by PEK)
//!               └── DEK (per-file, 256-bit random, stored only wrapped by KEK)
//!                     └── File payload: AES-256-GCM (key=DEK, nonce=random 96-bit)
//! ```
//!
//! Every wrap and every payload encryption draws a fresh random nonce. All
//! ciphertexts carry the 16-byte GCM tag appended at the end.
//!
//! The login password is handled separately: it is hashed into a self-describing
//! PHC string (see [`password`]) and is never used as key material.

pub mod aead;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod flow;
pub mod identity;
pub mod kdf;
pub mod keys;
pub mod password;
pub mod payload;

pub use aead::{decrypt, encrypt, split_tag, Nonce};
pub use envelope::{open, seal, FileEnvelope, SealedFile};
pub use error::{CryptoError, Result};
pub use flow::{change_file_password, download, register, upload, Registration};
pub use identity::{generate_identity, IdentityKeyPair};
pub use kdf::{
    derive_key, derive_pek, DerivationParams, KdfCost, Pek, MAX_MEM_COST_KIB, MAX_PARALLELISM,
    MAX_TIME_COST,
};
pub use keys::{
    generate_dek, generate_kek, unwrap_dek, unwrap_kek, unwrap_key, wrap_dek, wrap_kek, wrap_key,
    Dek, Kek, WrappedKey,
};
pub use password::{hash_auth_password, needs_rehash, verify_auth_password};
pub use payload::{DownloadPayload, KekRecord, RegistrationPayload};

/// Size of every symmetric key in the hierarchy (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// Size of a freshly generated Argon2id salt
pub const SALT_SIZE: usize = 16;
