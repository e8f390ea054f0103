//! Password hashing
//!
//! `Credentials` is the seam between the chat protocol and the hashing
//! primitive. `Argon2Credentials` stores PHC-format Argon2id digests.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use rand::rngs::OsRng;

use crate::error::AppError;

/// One-way password hashing capability
///
/// Both operations are CPU bound; callers run them on the blocking pool.
pub trait Credentials: Send + Sync + 'static {
    /// Hash a password into a self-describing digest
    fn hash(&self, password: &str) -> Result<String, AppError>;

    /// Check a password against a digest produced by `hash`
    fn verify(&self, password: &str, digest: &str) -> bool;
}

/// Argon2id hasher
#[derive(Clone, Default)]
pub struct Argon2Credentials {
    argon2: Argon2<'static>,
}

impl Argon2Credentials {
    /// Argon2id with the library's default cost parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Argon2id with explicit memory (KiB), iteration and lane costs
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, AppError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| AppError::Credential(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Credentials for Argon2Credentials {
    fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Credential(e.to_string()))
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        // Parameters are read from the digest itself
        PasswordHash::new(digest)
            .map(|parsed| {
                self.argon2
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}
