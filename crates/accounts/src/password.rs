//! Local account credentials.
//!
//! Stored hashes are Argon2id PHC strings with a per-account random salt. Accounts
//! provisioned through an OAuth2 provider have no stored hash and never match.

use crate::error::AccountError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hash a new account password into the PHC string kept in `users.password_hash`.
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!("Failed to hash password: {}", e);
            AccountError::PasswordHash(e.to_string())
        })
}

/// Check a login password against an account's stored hash, if it has one.
pub fn verify_password(password: &str, stored: Option<&str>) -> bool {
    let Some(parsed) = stored.and_then(|hash| PasswordHash::new(hash).ok()) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
