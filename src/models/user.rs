// src/models/user.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::password::PasswordHash;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    /// Soft deactivation. Users referenced elsewhere are never removed.
    pub is_active: bool,
    /// Preferred language code, e.g. `en`.
    pub language: String,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Fields needed to create a user. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub language: String,
}

/// User as exposed outside the auth core: no password hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub language: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            language: user.language.clone(),
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            language: user.language,
        }
    }
}

pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() || username.len() > 64 {
        return Err("Invalid username");
    }
    if username
        .chars()
        .any(|c| !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.')
    {
        return Err("Username contains invalid characters");
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if !email.contains('@') || email.len() > 254 {
        return Err("Invalid email format");
    }
    Ok(())
}
