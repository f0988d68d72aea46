//! Login-password hashing (PHC string format)
//!
//! Distinct from [`crate::kdf`]: the output is a one-way, salted hash that
//! encodes its own algorithm, version, cost and salt, e.g.
//! `$argon2id$v=19$m=19456,t=2,p=1$<salt>$<hash>`. It is only ever compared,
//! never used as key material.

use argon2::password_hash::{
    Error as PhcError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{CryptoError, Result};
use crate::kdf::KdfCost;

fn hasher(cost: &KdfCost) -> Result<Argon2<'static>> {
    cost.validate()?;
    Ok(Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        cost.to_argon2_params(None)?,
    ))
}

/// Parse a stored PHC string along with the cost it encodes. A cost outside
/// what [`KdfCost::validate`] accepts is treated as a corrupt record.
fn parse(phc: &str) -> Result<(PasswordHash<'_>, KdfCost)> {
    let parsed = PasswordHash::new(phc).map_err(|_| CryptoError::MalformedHash)?;
    if parsed.hash.is_none() || parsed.salt.is_none() {
        return Err(CryptoError::MalformedHash);
    }
    let params = Params::try_from(&parsed).map_err(|_| CryptoError::MalformedHash)?;
    let cost = KdfCost {
        mem_cost_kib: params.m_cost(),
        time_cost: params.t_cost(),
        parallelism: params.p_cost(),
    };
    cost.validate().map_err(|_| CryptoError::MalformedHash)?;
    Ok((parsed, cost))
}

/// Hash a login password into a canonical PHC string with a fresh salt.
pub fn hash_auth_password(password: &SecretString, cost: &KdfCost) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(cost)?
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a login password against a stored PHC string.
///
/// `Ok(false)` on mismatch; [`CryptoError::MalformedHash`] if the stored string
/// is not a well-formed Argon2 PHC hash.
pub fn verify_auth_password(password: &SecretString, phc: &str) -> Result<bool> {
    let (parsed, _) = parse(phc)?;
    // Algorithm, version and cost all come from the PHC string itself
    match Argon2::default().verify_password(password.expose_secret().as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PhcError::Password) => Ok(false),
        Err(_) => Err(CryptoError::MalformedHash),
    }
}

/// True when `phc` was produced with a different algorithm or cost than the
/// currently configured profile, so it should be re-hashed on next login.
pub fn needs_rehash(phc: &str, cost: &KdfCost) -> Result<bool> {
    let (parsed, stored) = parse(phc)?;
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return Ok(true);
    }
    Ok(stored != *cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::test_cost;

    #[test]
    fn test_hash_and_verify() {
        let pw = SecretString::from("login-password-1");
        let phc = hash_auth_password(&pw, &test_cost()).unwrap();

        assert!(phc.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(verify_auth_password(&pw, &phc).unwrap());
        assert!(!verify_auth_password(&SecretString::from("login-password-2"), &phc).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let pw = SecretString::from("same");
        let a = hash_auth_password(&pw, &test_cost()).unwrap();
        let b = hash_auth_password(&pw, &test_cost()).unwrap();
        assert_ne!(a, b, "each hash must carry its own salt");
    }

    #[test]
    fn test_malformed_hash() {
        let pw = SecretString::from("pw");
        for bad in [
            "",
            "plain-text",
            "$argon2id$v=19$m=1024",
            "$argon2id$v=19$m=abc,t=1,p=1$c2FsdHNhbHQ$aGFzaA",
        ] {
            assert_eq!(
                verify_auth_password(&pw, bad),
                Err(CryptoError::MalformedHash),
                "input: {bad:?}"
            );
        }
    }

    #[test]
    fn test_oversized_cost_is_malformed() {
        let pw = SecretString::from("pw");
        let phc = "$argon2id$v=19$m=4294967295,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA";
        assert_eq!(verify_auth_password(&pw, phc), Err(CryptoError::MalformedHash));
        assert_eq!(needs_rehash(phc, &test_cost()), Err(CryptoError::MalformedHash));

        let phc = "$argon2id$v=19$m=1024,t=100000,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA";
        assert_eq!(verify_auth_password(&pw, phc), Err(CryptoError::MalformedHash));
    }

    #[test]
    fn test_tampered_hash_does_not_verify() {
        let pw = SecretString::from("login-password-1");
        let phc = hash_auth_password(&pw, &test_cost()).unwrap();
        // Swap the last character of the hash segment for a different valid one
        let mut tampered = phc.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });
        assert!(!verify_auth_password(&pw, &tampered).unwrap_or(false));
    }

    #[test]
    fn test_needs_rehash() {
        let pw = SecretString::from("pw");
        let phc = hash_auth_password(&pw, &test_cost()).unwrap();

        assert!(!needs_rehash(&phc, &test_cost()).unwrap());
        let heavier = KdfCost {
            time_cost: 2,
            ..test_cost()
        };
        assert!(needs_rehash(&phc, &heavier).unwrap());
        assert_eq!(needs_rehash("garbage", &heavier), Err(CryptoError::MalformedHash));
    }

    #[test]
    fn test_invalid_cost_rejected() {
        let cost = KdfCost {
            parallelism: 0,
            ..test_cost()
        };
        let result = hash_auth_password(&SecretString::from("pw"), &cost);
        assert!(matches!(result, Err(CryptoError::InvalidParameters(_))));
    }
}
