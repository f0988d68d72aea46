//! Ed25519 identity key pair, generated once per registration
//!
//! Both halves use the standard PEM encodings (PKCS#8 for the private key,
//! SPKI for the public key) with the `-----BEGIN ...-----` armor and line
//! breaks stripped, i.e. base64 of the DER document. This is the same compact
//! form WebCrypto exports.

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::encoding;
use crate::error::{CryptoError, Result};

/// A freshly generated identity. The private half is shown to the user once
/// and never sent to the backend.
pub struct IdentityKeyPair {
    /// Base64 SPKI DER
    pub public_key: String,
    /// Base64 PKCS#8 DER
    pub private_key: SecretString,
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Drop PEM armor lines and whitespace, leaving the base64 body.
pub fn strip_pem_armor(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

/// Generate a new Ed25519 key pair from the OS CSPRNG.
pub fn generate_identity() -> Result<IdentityKeyPair> {
    let signing = SigningKey::generate(&mut OsRng);

    let private_pem = signing
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGeneration(format!("PKCS#8 encoding: {e}")))?;
    let public_pem = signing
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| CryptoError::KeyGeneration(format!("SPKI encoding: {e}")))?;

    tracing::debug!("generated identity key pair");
    Ok(IdentityKeyPair {
        public_key: strip_pem_armor(&public_pem),
        private_key: SecretString::from(strip_pem_armor(&private_pem)),
    })
}

/// Parse a private key given as compact base64 or full PEM.
pub fn signing_key_from_text(private_key: &SecretString) -> Result<SigningKey> {
    let der = Zeroizing::new(encoding::decode(&strip_pem_armor(
        private_key.expose_secret(),
    ))?);
    SigningKey::from_pkcs8_der(&der)
        .map_err(|_| CryptoError::InvalidKey("not a PKCS#8 Ed25519 private key".into()))
}

/// Parse a public key given as compact base64 or full PEM.
pub fn verifying_key_from_text(public_key: &str) -> Result<VerifyingKey> {
    let der = encoding::decode(&strip_pem_armor(public_key))?;
    VerifyingKey::from_public_key_der(&der)
        .map_err(|_| CryptoError::InvalidKey("not an SPKI Ed25519 public key".into()))
}

/// Sign `message`, returning a base64 signature.
pub fn sign(private_key: &SecretString, message: &[u8]) -> Result<String> {
    let signing = signing_key_from_text(private_key)?;
    Ok(encoding::encode(signing.sign(message).to_bytes()))
}

/// Verify a base64 signature. `Ok(false)` on mismatch.
pub fn verify(public_key: &str, message: &[u8], signature: &str) -> Result<bool> {
    let verifying = verifying_key_from_text(public_key)?;
    let sig_bytes = encoding::decode(signature)?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|_| CryptoError::Encoding("signature must be 64 bytes".into()))?;
    Ok(verifying.verify(message, &signature).is_ok())
}
