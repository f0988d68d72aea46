//! End-to-end flows: registration → upload → download
//!
//! ```text
//! Unregistered --register--> Registered --upload--> FileStored
//! FileStored --download(correct password)--> FileRecovered
//! FileStored --download(wrong password)----> WrongPassword (retry allowed)
//! ```
//!
//! Each call is self-contained: the PEK is derived and the KEK unwrapped
//! inside the call and both are zeroized before it returns. Nothing here
//! holds state between calls, so concurrent uploads/downloads for the same
//! user are independent. Re-wrapping the KEK (`change_file_password`) replaces
//! the stored record and must not race another re-wrap of the same record.

use secrecy::SecretString;
use tracing::{debug, info};

use crate::envelope::{self, FileEnvelope};
use crate::error::Result;
use crate::identity::{generate_identity, IdentityKeyPair};
use crate::kdf::{derive_pek, DerivationParams, KdfCost};
use crate::keys::{generate_dek, generate_kek, unwrap_dek, unwrap_kek, wrap_dek, wrap_kek, Kek};
use crate::payload::KekRecord;

/// Result of registration. `kek_record` and `identity.public_key` go to the
/// backend; `identity.private_key` is shown to the user once.
#[derive(Debug)]
pub struct Registration {
    pub kek_record: KekRecord,
    pub identity: IdentityKeyPair,
}

/// Generate the user's KEK, wrap it under a PEK derived from `file_password`
/// with a fresh salt, and generate the identity key pair.
pub fn register(file_password: &SecretString, cost: &KdfCost) -> Result<Registration> {
    let params = DerivationParams::generate(*cost)?;
    let pek = derive_pek(file_password, &params)?;
    let kek = generate_kek()?;
    let wrapped = wrap_kek(&kek, &pek)?;
    let identity = generate_identity()?;

    info!("registration keys generated");
    Ok(Registration {
        kek_record: KekRecord::new(wrapped, params),
        identity,
    })
}

/// Re-derive the PEK for `record` and unwrap the KEK.
fn unlock_kek(record: &KekRecord, file_password: &SecretString, fallback: &KdfCost) -> Result<Kek> {
    let pek = derive_pek(file_password, &record.derivation_params(fallback))?;
    let kek = unwrap_kek(&record.wrapped_kek(), &pek)?;
    debug!("KEK unwrapped");
    Ok(kek)
}

/// Encrypt a file for upload: fresh DEK, sealed payload, DEK wrapped under
/// the user's KEK. The raw DEK and KEK are dropped (zeroized) on return.
pub fn upload(
    record: &KekRecord,
    file_password: &SecretString,
    fallback: &KdfCost,
    file_name: &str,
    file_type: &str,
    file_bytes: &[u8],
) -> Result<FileEnvelope> {
    let kek = unlock_kek(record, file_password, fallback)?;
    let dek = generate_dek()?;
    let sealed = envelope::seal(file_bytes, file_name, file_type, &dek)?;
    let wrapped_dek = wrap_dek(&dek, &kek)?;

    info!(file_name, file_size = file_bytes.len(), "file sealed");
    Ok(FileEnvelope::new(sealed, wrapped_dek))
}

/// Recover a file. A wrong password fails with
/// [`crate::CryptoError::WrongPassword`] before the payload is touched.
pub fn download(
    record: &KekRecord,
    file: &FileEnvelope,
    file_password: &SecretString,
    fallback: &KdfCost,
) -> Result<Vec<u8>> {
    let kek = unlock_kek(record, file_password, fallback)?;
    let dek = unwrap_dek(&file.wrapped_dek, &kek)?;
    let plaintext = envelope::open(file, &dek)?;

    info!(file_name = %file.file_name, file_size = plaintext.len(), "file opened");
    Ok(plaintext)
}

/// Re-wrap the same KEK under a new file password with a fresh salt and
/// nonce. Every existing wrapped DEK stays valid.
pub fn change_file_password(
    record: &KekRecord,
    old_password: &SecretString,
    new_password: &SecretString,
    cost: &KdfCost,
) -> Result<KekRecord> {
    let kek = unlock_kek(record, old_password, cost)?;
    let params = DerivationParams::generate(*cost)?;
    let pek = derive_pek(new_password, &params)?;
    let wrapped = wrap_kek(&kek, &pek)?;

    info!("file password changed");
    Ok(KekRecord::new(wrapped, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::kdf::test_cost;

    #[test]
    fn test_register_upload_download() {
        let pw = SecretString::from("file-password-1");
        let reg = register(&pw, &test_cost()).unwrap();

        let file = upload(
            &reg.kek_record,
            &pw,
            &test_cost(),
            "a.txt",
            "text/plain",
            b"contents",
        )
        .unwrap();
        assert_eq!(file.file_size, 8);
        assert_eq!(
            download(&reg.kek_record, &file, &pw, &test_cost()).unwrap(),
            b"contents"
        );
    }

    #[test]
    fn test_download_wrong_password() {
        let pw = SecretString::from("file-password-1");
        let reg = register(&pw, &test_cost()).unwrap();
        let file = upload(&reg.kek_record, &pw, &test_cost(), "a", "b", b"x").unwrap();

        let result = download(
            &reg.kek_record,
            &file,
            &SecretString::from("file-password-2"),
            &test_cost(),
        );
        assert_eq!(result, Err(CryptoError::WrongPassword));
    }

    #[test]
    fn test_each_upload_gets_its_own_dek() {
        let pw = SecretString::from("pw-123456");
        let reg = register(&pw, &test_cost()).unwrap();

        let a = upload(&reg.kek_record, &pw, &test_cost(), "a", "t", b"same").unwrap();
        let b = upload(&reg.kek_record, &pw, &test_cost(), "a", "t", b"same").unwrap();

        assert_ne!(a.wrapped_dek, b.wrapped_dek);
        assert_ne!(a.file_nonce, b.file_nonce);
        assert_ne!(a.encrypted_file, b.encrypted_file);
    }

    #[test]
    fn test_change_file_password_keeps_files_readable() {
        let old = SecretString::from("old-password");
        let new = SecretString::from("new-password");
        let reg = register(&old, &test_cost()).unwrap();
        let file = upload(&reg.kek_record, &old, &test_cost(), "a", "t", b"kept").unwrap();

        let rewrapped = change_file_password(&reg.kek_record, &old, &new, &test_cost()).unwrap();
        assert_ne!(rewrapped.salt, reg.kek_record.salt);
        assert_ne!(rewrapped.iv_kek, reg.kek_record.iv_kek);

        assert_eq!(download(&rewrapped, &file, &new, &test_cost()).unwrap(), b"kept");
        assert_eq!(
            download(&rewrapped, &file, &old, &test_cost()),
            Err(CryptoError::WrongPassword)
        );
    }

    #[test]
    fn test_download_with_corrupt_record_cost_fails() {
        let pw = SecretString::from("file-password-1");
        let reg = register(&pw, &test_cost()).unwrap();
        let file = upload(&reg.kek_record, &pw, &test_cost(), "a", "t", b"x").unwrap();

        let mut json: serde_json::Value =
            serde_json::from_str(&reg.kek_record.to_json().unwrap()).unwrap();
        json["m"] = serde_json::json!(u32::MAX);
        let corrupt = KekRecord::from_json(&json.to_string()).unwrap();

        let result = download(&corrupt, &file, &pw, &test_cost());
        assert!(matches!(result, Err(CryptoError::InvalidParameters(_))));
    }

    #[test]
    fn test_change_file_password_requires_old_password() {
        let reg = register(&SecretString::from("right"), &test_cost()).unwrap();
        let result = change_file_password(
            &reg.kek_record,
            &SecretString::from("wrong"),
            &SecretString::from("new"),
            &test_cost(),
        );
        assert!(matches!(result, Err(CryptoError::WrongPassword)));
    }
}
