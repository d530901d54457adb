//! Secret sealing collaborator. The core never inspects sealed secrets.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::errors::OrreryError;

pub trait Crypto: Send + Sync {
    /// Seal a plaintext secret for storage.
    fn secure_secret(&self, plain: &str) -> Result<String, OrreryError>;

    /// Check `candidate` against a previously sealed secret.
    fn verify_secret(&self, candidate: &str, sealed: &str) -> Result<(), OrreryError>;
}

/// Argon2id with a random salt per secret, stored as a PHC string.
#[derive(Debug, Default, Clone)]
pub struct Argon2Crypto;

impl Argon2Crypto {
    pub fn new() -> Self {
        Self
    }
}

impl Crypto for Argon2Crypto {
    fn secure_secret(&self, plain: &str) -> Result<String, OrreryError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| OrreryError::CryptoFailure(format!("Secret hashing failed: {}", e)))?;
        Ok(hash.to_string())
    }

    fn verify_secret(&self, candidate: &str, sealed: &str) -> Result<(), OrreryError> {
        // A stored value that is not a PHC string can never verify.
        let parsed = PasswordHash::new(sealed).map_err(|_| OrreryError::VerificationFailed)?;
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .map_err(|_| OrreryError::VerificationFailed)
    }
}

/// Reversible stand-in so unit tests do not pay for argon2.
#[cfg(test)]
pub(crate) struct PlainCrypto;

#[cfg(test)]
impl Crypto for PlainCrypto {
    fn secure_secret(&self, plain: &str) -> Result<String, OrreryError> {
        Ok(format!("sealed:{plain}"))
    }

    fn verify_secret(&self, candidate: &str, sealed: &str) -> Result<(), OrreryError> {
        if sealed == format!("sealed:{candidate}") {
            Ok(())
        } else {
            Err(OrreryError::VerificationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_verify() {
        let crypto = Argon2Crypto::new();
        let sealed = crypto.secure_secret("hunter2").unwrap();

        assert!(sealed.starts_with("$argon2"));
        assert_ne!(sealed, "hunter2");
        crypto.verify_secret("hunter2", &sealed).unwrap();
    }

    #[test]
    fn test_wrong_secret_fails() {
        let crypto = Argon2Crypto::new();
        let sealed = crypto.secure_secret("hunter2").unwrap();
        let err = crypto.verify_secret("hunter3", &sealed).unwrap_err();
        assert!(matches!(err, OrreryError::VerificationFailed));
    }

    #[test]
    fn test_salts_differ() {
        let crypto = Argon2Crypto::new();
        let a = crypto.secure_secret("same").unwrap();
        let b = crypto.secure_secret("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_sealed_value_fails_verification() {
        let crypto = Argon2Crypto::new();
        let err = crypto.verify_secret("x", "not-a-hash").unwrap_err();
        assert!(matches!(err, OrreryError::VerificationFailed));
    }
}
