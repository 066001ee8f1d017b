//! Password hashing and verification.
//!
//! Argon2id with a per-hash random salt embedded in the PHC digest string,
//! so no separate salt storage is needed. Verification goes through the
//! argon2 crate's constant-time comparison.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::AuthError;

/// Hash a plaintext password into a PHC digest string.
///
/// # Errors
///
/// Returns `AuthError::Config` if the hasher rejects its parameters; this is
/// a deployment fault, never a user-facing outcome.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Config(format!("Password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored digest.
///
/// A digest that fails to parse verifies as `false` rather than erroring;
/// a corrupted stored hash must read as a mismatch, not a crash.
#[must_use]
pub fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
