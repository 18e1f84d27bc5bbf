// src/models/membership.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Selection state of a membership.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    /// Known but not selected (`0`).
    Pending,
    /// Currently selected tenant (`1`). At most one per user.
    Active,
}

/// Link between a user and an organization, unique per pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Membership {
    pub user_id: i64,
    pub organization_id: i64,
    /// Soft delete of the row itself.
    pub is_active: bool,
    pub status: MembershipStatus,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: i64, organization_id: i64, status: MembershipStatus) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            organization_id,
            is_active: true,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Row is live and selected.
    pub fn is_selected(&self) -> bool {
        self.is_active && self.status == MembershipStatus::Active
    }
}
