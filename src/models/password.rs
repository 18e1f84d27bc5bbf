// src/models/password.rs

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Password hashing algorithm
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum PasswordAlgorithm {
    Bcrypt,
}

/// Stored password hash. bcrypt embeds its salt in the hash string.
#[derive(Serialize, Deserialize, Clone)]
pub struct PasswordHash {
    pub hash: String,
    pub algorithm: PasswordAlgorithm,
}

/// Verified against when the login name is unknown so both failure paths
/// cost one bcrypt verification.
static DUMMY_HASH: Lazy<Option<PasswordHash>> =
    Lazy::new(|| PasswordHash::new_bcrypt("dashauth-unknown-user").ok());

impl PasswordHash {
    pub fn new_bcrypt(password: &str) -> Result<Self, PasswordError> {
        Self::new_bcrypt_with_cost(password, bcrypt::DEFAULT_COST)
    }

    pub fn new_bcrypt_with_cost(password: &str, cost: u32) -> Result<Self, PasswordError> {
        if password.is_empty() {
            return Err(PasswordError::Empty);
        }
        let hash = bcrypt::hash(password, cost).map_err(|_| PasswordError::HashFailed)?;
        Ok(Self {
            hash,
            algorithm: PasswordAlgorithm::Bcrypt,
        })
    }

    pub fn verify(&self, password: &str) -> Result<bool, PasswordError> {
        match self.algorithm {
            PasswordAlgorithm::Bcrypt => {
                bcrypt::verify(password, &self.hash).map_err(|_| PasswordError::VerificationFailed)
            }
        }
    }

    /// Burns one verification for a login name that matched no user.
    pub fn verify_dummy(password: &str) {
        if let Some(dummy) = DUMMY_HASH.as_ref() {
            let _ = dummy.verify(password);
        }
    }
}

// Never print the hash itself.
impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHash")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("failed to hash password")]
    HashFailed,
    #[error("failed to verify password")]
    VerificationFailed,
}
