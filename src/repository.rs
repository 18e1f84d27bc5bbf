// src/repository.rs

//! Data-access ports consumed by the auth core.
//!
//! [`crate::store::AuthStore`] implements all of them on top of RadDB. The
//! membership invariants (one live row per user/organization pair, one
//! selected membership per user) are enforced behind these traits, by the
//! storage layer, not by callers.

use crate::models::{
    Alias, Membership, NewOrganization, NewUser, Organization, Permission, PermissionKey, Role,
    RoleKey, User,
};
use crate::store::StoreError;

pub trait UserRepository: Send + Sync {
    fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Looks a user up by username or email, case-insensitively.
    fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;

    fn set_user_active(&self, id: i64, active: bool) -> Result<User, StoreError>;
}

pub trait OrganizationRepository: Send + Sync {
    fn create_organization(&self, org: NewOrganization) -> Result<Organization, StoreError>;

    fn find_organization(&self, id: i64) -> Result<Option<Organization>, StoreError>;

    /// Fails with [`StoreError::Protected`] for the system organization.
    fn set_organization_active(&self, id: i64, active: bool) -> Result<Organization, StoreError>;
}

pub trait MembershipRepository: Send + Sync {
    /// Every membership row of the user, live or not, ordered by organization id.
    fn memberships_of(&self, user_id: i64) -> Result<Vec<Membership>, StoreError>;

    fn find_membership(
        &self,
        user_id: i64,
        organization_id: i64,
    ) -> Result<Option<Membership>, StoreError>;

    /// Adds a `Pending` membership, reactivating a soft-deleted row.
    fn add_membership(&self, user_id: i64, organization_id: i64) -> Result<Membership, StoreError>;

    /// Soft-deletes the row and clears its selection.
    fn remove_membership(&self, user_id: i64, organization_id: i64)
        -> Result<Membership, StoreError>;

    /// Atomically selects `organization_id` and demotes every other selected
    /// membership of the user. With `provision`, a missing or soft-deleted
    /// row is created or revived first; without it that case is
    /// [`StoreError::NotFound`]. The target organization must be active.
    fn activate_membership(
        &self,
        user_id: i64,
        organization_id: i64,
        provision: bool,
    ) -> Result<Membership, StoreError>;
}

pub trait RbacRepository: Send + Sync {
    fn create_role(
        &self,
        key: RoleKey,
        description: Option<String>,
    ) -> Result<Role, StoreError>;

    fn create_permission(
        &self,
        key: PermissionKey,
        module: String,
    ) -> Result<Permission, StoreError>;

    fn set_role_permission(
        &self,
        role: &RoleKey,
        permission: &PermissionKey,
        active: bool,
    ) -> Result<(), StoreError>;

    fn set_user_role(&self, user_id: i64, role: &RoleKey, active: bool) -> Result<(), StoreError>;

    /// Keys of active roles actively assigned to the user, in assignment order.
    fn roles_of(&self, user_id: i64) -> Result<Vec<RoleKey>, StoreError>;

    /// Keys of active permissions actively granted to the role under its own alias.
    fn permissions_of(&self, role: &RoleKey) -> Result<Vec<PermissionKey>, StoreError>;

    fn roles_for_alias(&self, alias: &Alias) -> Result<Vec<Role>, StoreError>;
}

/// Everything the session bridge needs.
pub trait AuthRepository:
    UserRepository + OrganizationRepository + MembershipRepository + RbacRepository
{
}

impl<T> AuthRepository for T where
    T: UserRepository + OrganizationRepository + MembershipRepository + RbacRepository
{
}
