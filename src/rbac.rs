// src/rbac.rs

//! Role-based access control: per-request permission snapshots and the only
//! sanctioned way to change role assignments.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::models::well_known::BOOTSTRAP_USER_ID;
use crate::models::{Permission, PermissionKey, Role, RoleKey};
use crate::repository::RbacRepository;
use crate::store::StoreError;

// ========================================
// PermissionGraph
// ========================================

/// A user's roles and what each role grants, resolved once per request.
///
/// Every check after [`PermissionGraph::resolve`] is a hash lookup. The
/// super-role short-circuits all checks here and nowhere else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionGraph {
    roles: HashMap<RoleKey, HashSet<PermissionKey>>,
}

impl PermissionGraph {
    /// Loads the user's active role assignments and each role's active grants.
    pub fn resolve<R>(repo: &R, user_id: i64) -> Result<Self, StoreError>
    where
        R: RbacRepository + ?Sized,
    {
        let mut roles = HashMap::new();
        for role in repo.roles_of(user_id)? {
            let permissions: HashSet<PermissionKey> =
                repo.permissions_of(&role)?.into_iter().collect();
            roles.insert(role, permissions);
        }
        tracing::debug!(user_id, roles = roles.len(), "resolved permission graph");
        Ok(Self { roles })
    }

    pub fn from_roles<I, P>(roles: I) -> Self
    where
        I: IntoIterator<Item = (RoleKey, P)>,
        P: IntoIterator<Item = PermissionKey>,
    {
        Self {
            roles: roles
                .into_iter()
                .map(|(role, perms)| (role, perms.into_iter().collect()))
                .collect(),
        }
    }

    pub fn is_super(&self) -> bool {
        self.roles.contains_key(&RoleKey::super_role())
    }

    /// True for a held role, or for any role when the super-role is held.
    pub fn has_role(&self, role: &RoleKey) -> bool {
        self.is_super() || self.roles.contains_key(role)
    }

    /// With `role`, only that role's grants are consulted and an absent role
    /// answers false. Without it, the super-role or a grant by any held role
    /// suffices.
    pub fn has_permission(&self, permission: &PermissionKey, role: Option<&RoleKey>) -> bool {
        match role {
            Some(role) => {
                (role.is_super_role() && self.is_super())
                    || self
                        .roles
                        .get(role)
                        .is_some_and(|granted| granted.contains(permission))
            }
            None => {
                self.is_super() || self.roles.values().any(|granted| granted.contains(permission))
            }
        }
    }

    /// `{"{alias}_{role}": {"{alias}_{permission}": true}}`
    pub fn to_wire(&self) -> BTreeMap<String, BTreeMap<String, bool>> {
        self.roles
            .iter()
            .map(|(role, perms)| {
                let perms = perms.iter().map(|p| (p.to_string(), true)).collect();
                (role.to_string(), perms)
            })
            .collect()
    }
}

impl Serialize for PermissionGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

// ========================================
// Role administration
// ========================================

#[derive(Debug, Error)]
pub enum RbacError {
    #[error("the {role} role of the bootstrap user can only be revoked by another {role} holder")]
    ProtectedRole { role: RoleKey },
    #[error("only a {role} holder can grant {role}")]
    SuperRoleRequired { role: RoleKey },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Who is changing role assignments.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    /// Local operator with direct store access (CLI).
    Operator,
    /// Authenticated user acting through the application.
    Principal(&'a PermissionGraph),
}

impl Actor<'_> {
    fn holds_super_role(&self) -> bool {
        matches!(self, Actor::Principal(graph) if graph.is_super())
    }
}

pub struct RoleAdministration<R> {
    repo: Arc<R>,
}

impl<R: RbacRepository> RoleAdministration<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub fn create_role(&self, key: RoleKey, description: Option<String>) -> Result<Role, RbacError> {
        let role = self.repo.create_role(key, description)?;
        tracing::info!(role = %role.key, "role created");
        Ok(role)
    }

    pub fn create_permission(&self, key: PermissionKey, module: impl Into<String>) -> Result<Permission, RbacError> {
        let permission = self.repo.create_permission(key, module.into())?;
        tracing::info!(permission = %permission.key, module = %permission.module, "permission created");
        Ok(permission)
    }

    pub fn grant_permission(&self, role: &RoleKey, permission: &PermissionKey) -> Result<(), RbacError> {
        self.repo.set_role_permission(role, permission, true)?;
        tracing::info!(%role, %permission, "permission granted");
        Ok(())
    }

    pub fn revoke_permission(&self, role: &RoleKey, permission: &PermissionKey) -> Result<(), RbacError> {
        self.repo.set_role_permission(role, permission, false)?;
        tracing::info!(%role, %permission, "permission revoked");
        Ok(())
    }

    pub fn assign_role(&self, actor: Actor<'_>, user_id: i64, role: &RoleKey) -> Result<(), RbacError> {
        if role.is_super_role() && matches!(actor, Actor::Principal(_)) && !actor.holds_super_role() {
            return Err(RbacError::SuperRoleRequired { role: role.clone() });
        }
        self.repo.set_user_role(user_id, role, true)?;
        tracing::info!(user_id, %role, "role assigned");
        Ok(())
    }

    pub fn revoke_role(&self, actor: Actor<'_>, user_id: i64, role: &RoleKey) -> Result<(), RbacError> {
        if role.is_super_role() && user_id == BOOTSTRAP_USER_ID && !actor.holds_super_role() {
            tracing::warn!(user_id, %role, "refused to strip protected role");
            return Err(RbacError::ProtectedRole { role: role.clone() });
        }
        self.repo.set_user_role(user_id, role, false)?;
        tracing::info!(user_id, %role, "role revoked");
        Ok(())
    }
}
