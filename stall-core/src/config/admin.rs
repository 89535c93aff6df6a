//! Seller API authentication.

use argon2::{Argon2, PasswordHash, PasswordVerifier};

/// Seller credentials, holding only the argon2 hash of the admin secret.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub secret_hash: String,
}

impl AdminConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Check a presented secret.
    ///
    /// An unparsable stored hash rejects every secret.
    pub fn verify_secret(&self, presented: &str) -> bool {
        let Ok(hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(presented.as_bytes(), &hash)
            .is_ok()
    }
}
