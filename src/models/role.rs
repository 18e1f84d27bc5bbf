// src/models/role.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::well_known::{SUPER_ROLE_NAME, SYSTEM_ALIAS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid alias: {0:?}")]
    InvalidAlias(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("key {0:?} is not of the form alias_name")]
    Unqualified(String),
}

// ========================================
// Alias: organization kind tag
// ========================================

/// Organization kind that scopes roles and permissions.
///
/// Lowercase ASCII letters, digits and `-`. Underscores are rejected so the
/// `{alias}_{name}` wire form always splits at the first `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alias(String);

impl Alias {
    pub fn new(value: impl Into<String>) -> Result<Self, KeyError> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= 64
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid {
            Ok(Self(value))
        } else {
            Err(KeyError::InvalidAlias(value))
        }
    }

    pub fn system() -> Self {
        Self(SYSTEM_ALIAS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ALIAS
    }
}

impl TryFrom<String> for Alias {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Alias> for String {
    fn from(alias: Alias) -> Self {
        alias.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_name(name: String) -> Result<String, KeyError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > 128 || trimmed != name {
        return Err(KeyError::InvalidName(name));
    }
    Ok(name)
}

fn split_key(s: &str) -> Result<(Alias, String), KeyError> {
    let (alias, name) = s
        .split_once('_')
        .ok_or_else(|| KeyError::Unqualified(s.to_string()))?;
    Ok((Alias::new(alias)?, validate_name(name.to_string())?))
}

// ========================================
// RoleKey / PermissionKey
// ========================================

/// Alias-scoped role identity. Wire form: `{alias}_{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleKey {
    pub alias: Alias,
    pub name: String,
}

impl RoleKey {
    pub fn new(alias: Alias, name: impl Into<String>) -> Result<Self, KeyError> {
        Ok(Self {
            alias,
            name: validate_name(name.into())?,
        })
    }

    /// The role that bypasses every permission check.
    pub fn super_role() -> Self {
        Self {
            alias: Alias::system(),
            name: SUPER_ROLE_NAME.to_string(),
        }
    }

    pub fn is_super_role(&self) -> bool {
        self.alias.is_system() && self.name == SUPER_ROLE_NAME
    }
}

impl fmt::Display for RoleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.alias, self.name)
    }
}

impl FromStr for RoleKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alias, name) = split_key(s)?;
        Ok(Self { alias, name })
    }
}

/// Alias-scoped capability identity. Wire form: `{alias}_{name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey {
    pub alias: Alias,
    pub name: String,
}

impl PermissionKey {
    pub fn new(alias: Alias, name: impl Into<String>) -> Result<Self, KeyError> {
        Ok(Self {
            alias,
            name: validate_name(name.into())?,
        })
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.alias, self.name)
    }
}

impl FromStr for PermissionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alias, name) = split_key(s)?;
        Ok(Self { alias, name })
    }
}

// ========================================
// Records
// ========================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Role {
    pub key: RoleKey,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Permission {
    pub key: PermissionKey,
    /// Free-text grouping label for the admin UI.
    pub module: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<Utc>,
}

/// Role assigned to a user.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserRole {
    pub user_id: i64,
    pub role: RoleKey,
    pub is_active: bool,
    pub updated_at: chrono::DateTime<Utc>,
}

/// Permission granted to a role. Only meaningful when both share an alias.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RolePermission {
    pub role: RoleKey,
    pub permission: PermissionKey,
    pub is_active: bool,
    pub updated_at: chrono::DateTime<Utc>,
}
