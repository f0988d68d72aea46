//! Key derivation: Argon2id file password → PEK

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, Result};
use crate::{KEY_SIZE, SALT_SIZE};

/// Minimum salt length accepted by Argon2
const MIN_SALT_LEN: usize = 8;

/// Upper bounds for any cost this client will run, whether configured locally
/// or read back from a stored record or hash. Argon2's own limits allow
/// allocations no client can satisfy.
pub const MAX_MEM_COST_KIB: u32 = 2 * 1024 * 1024;
pub const MAX_TIME_COST: u32 = 64;
pub const MAX_PARALLELISM: u32 = 64;

/// A 256-bit password-derived encryption key. Only ever used to wrap/unwrap
/// the KEK; never stored.
///
/// Zeroized on drop to prevent secrets lingering in memory.
pub struct Pek {
    bytes: [u8; KEY_SIZE],
}

impl Pek {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Pek {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Pek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pek").field("bytes", &"[REDACTED]").finish()
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfCost {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfCost {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfCost {
    /// Cost profile for login-password hashes. Verified on every sign-in, so
    /// lighter than the file-password profile.
    pub fn auth_default() -> Self {
        Self {
            mem_cost_kib: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }

    /// Check that the cost is accepted by Argon2id. Errors name the field only.
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost_kib == 0 {
            return Err(CryptoError::InvalidParameters("memory cost must be positive".into()));
        }
        if self.time_cost == 0 {
            return Err(CryptoError::InvalidParameters("time cost must be positive".into()));
        }
        if self.parallelism == 0 {
            return Err(CryptoError::InvalidParameters("parallelism must be positive".into()));
        }
        if self.mem_cost_kib > MAX_MEM_COST_KIB {
            return Err(CryptoError::InvalidParameters(
                "memory cost above supported maximum".into(),
            ));
        }
        if self.time_cost > MAX_TIME_COST {
            return Err(CryptoError::InvalidParameters(
                "time cost above supported maximum".into(),
            ));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(CryptoError::InvalidParameters(
                "parallelism above supported maximum".into(),
            ));
        }
        self.to_argon2_params(None).map(|_| ())
    }

    pub(crate) fn to_argon2_params(&self, output_len: Option<usize>) -> Result<Params> {
        Params::new(
            self.mem_cost_kib,
            self.time_cost,
            self.parallelism,
            output_len,
        )
        .map_err(|e| CryptoError::InvalidParameters(argon2_param_field(e).into()))
    }
}

/// Map an Argon2 parameter error to the name of the offending setting.
fn argon2_param_field(e: argon2::Error) -> &'static str {
    use argon2::Error as E;
    match e {
        E::MemoryTooLittle | E::MemoryTooMuch => "memory cost out of range",
        E::TimeTooSmall => "time cost out of range",
        E::ThreadsTooFew | E::ThreadsTooMany => "parallelism out of range",
        E::SaltTooShort | E::SaltTooLong => "salt length out of range",
        E::OutputTooShort | E::OutputTooLong => "output length out of range",
        _ => "unsupported parameters",
    }
}

/// Salt and cost persisted next to a wrapped KEK. Re-deriving with the same
/// values reproduces the same PEK bit-for-bit; changing any of them
/// invalidates the wrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationParams {
    #[serde(with = "crate::encoding::base64_bytes")]
    pub salt: Vec<u8>,
    #[serde(flatten)]
    pub cost: KdfCost,
}

impl DerivationParams {
    /// Fresh random 16-byte salt with the given cost.
    pub fn generate(cost: KdfCost) -> Result<Self> {
        let mut salt = vec![0u8; SALT_SIZE];
        rand::thread_rng().try_fill_bytes(&mut salt)?;
        Ok(Self { salt, cost })
    }

    pub fn validate(&self) -> Result<()> {
        self.cost.validate()?;
        if self.salt.len() < MIN_SALT_LEN {
            return Err(CryptoError::InvalidParameters("salt too short".into()));
        }
        Ok(())
    }
}

/// Derive `output_len` bytes from `secret` with Argon2id v0x13.
///
/// Deterministic for fixed `(secret, params)`.
pub fn derive_key(
    secret: &[u8],
    params: &DerivationParams,
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    params.validate()?;
    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        params.cost.to_argon2_params(Some(output_len))?,
    );

    let mut out = Zeroizing::new(vec![0u8; output_len]);
    argon2
        .hash_password_into(secret, &params.salt, &mut out)
        .map_err(|e| CryptoError::InvalidParameters(argon2_param_field(e).into()))?;
    Ok(out)
}

/// Derive the 256-bit PEK from a file password.
pub fn derive_pek(password: &SecretString, params: &DerivationParams) -> Result<Pek> {
    let derived = derive_key(password.expose_secret().as_bytes(), params, KEY_SIZE)?;
    let mut bytes = [0u8; KEY_SIZE];
    bytes.copy_from_slice(&derived);
    tracing::debug!("derived PEK");
    Ok(Pek::from_bytes(bytes))
}

#[cfg(test)]
pub(crate) fn test_cost() -> KdfCost {
    KdfCost {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}
