// src/models/mod.rs

pub mod membership;
pub mod organization;
pub mod password;
pub mod role;
pub mod user;
pub mod well_known;

// Re-exports

pub use membership::{Membership, MembershipStatus};
pub use organization::{NewOrganization, Organization};
pub use password::{PasswordAlgorithm, PasswordError, PasswordHash};
pub use role::{Alias, KeyError, Permission, PermissionKey, Role, RoleKey, RolePermission, UserRole};
pub use user::{NewUser, User, UserProfile};
