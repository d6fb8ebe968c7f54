//! Password hashing and verification (Argon2id).
//!
//! [`hash`] generates a random salt via `OsRng` and returns a self-describing
//! PHC-format digest (`$argon2id$v=19$m=19456,t=2,p=1$...`) that embeds the
//! algorithm parameters and salt. [`verify`] recomputes with the embedded
//! parameters and compares in constant time; a malformed digest verifies as
//! `false` rather than erroring out. Plaintext never leaves these functions.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to hash password")]
pub struct HashError;

/// Hash a plaintext password into a PHC-format Argon2id digest.
///
/// # Errors
/// Returns [`HashError`] if the key derivation itself fails.
pub fn hash(plaintext: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|digest| digest.to_string())
        .map_err(|_| HashError)
}

/// Verify a plaintext password against a stored PHC-format digest.
///
/// A digest that cannot be parsed counts as a mismatch.
#[must_use]
pub fn verify(digest: &str, plaintext: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };

    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip() {
        let digest = hash("hunter2!").unwrap();

        assert_ne!(digest, "hunter2!");
        assert!(digest.starts_with("$argon2id$"));
        assert!(verify(&digest, "hunter2!"));
        assert!(!verify(&digest, "hunter3!"));
    }

    #[test]
    fn test_hash_is_salted() {
        let first = hash("same-password").unwrap();
        let second = hash("same-password").unwrap();

        // Fresh salt per call, digests never repeat
        assert_ne!(first, second);
        assert!(verify(&first, "same-password"));
        assert!(verify(&second, "same-password"));
    }

    #[test]
    fn test_malformed_digest_is_a_mismatch() {
        assert!(!verify("not-a-phc-string", "anything"));
        assert!(!verify("", "anything"));
    }
}
