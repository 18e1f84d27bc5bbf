// src/models/organization.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::role::Alias;

/// Tenant record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    /// Organization kind; scopes the roles and permissions that apply here.
    pub alias: Alias,
    pub is_active: bool,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    pub parent_id: Option<i64>,
    pub alias: Alias,
}
