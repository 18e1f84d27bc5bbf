// src/context.rs

use serde::Serialize;
use std::sync::Arc;

use crate::auth::Subject;
use crate::models::{Organization, PermissionKey, RoleKey, UserProfile};
use crate::rbac::PermissionGraph;

/// Who is making the current request, in which organization, with what
/// permissions. Built fresh for every request and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedUser {
    profile: UserProfile,
    organization: Organization,
    permissions: PermissionGraph,
}

impl AuthenticatedUser {
    pub(crate) fn new(profile: UserProfile, organization: Organization, permissions: PermissionGraph) -> Self {
        Self {
            profile,
            organization,
            permissions,
        }
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    pub fn permissions(&self) -> &PermissionGraph {
        &self.permissions
    }

    pub fn subject(&self) -> Subject {
        Subject {
            user_id: self.profile.id,
            organization_id: self.organization.id,
        }
    }

    pub fn has_role(&self, role: &RoleKey) -> bool {
        self.permissions.has_role(role)
    }

    pub fn has_permission(&self, permission: &PermissionKey) -> bool {
        self.permissions.has_permission(permission, None)
    }

    pub fn has_permission_via(&self, permission: &PermissionKey, role: &RoleKey) -> bool {
        self.permissions.has_permission(permission, Some(role))
    }
}

/// Authentication outcome attached to every request. Anonymous callers get
/// `false` from every check.
#[derive(Debug, Clone, Default)]
pub struct RequestAuth(Option<Arc<AuthenticatedUser>>);

impl RequestAuth {
    pub fn authenticated(user: AuthenticatedUser) -> Self {
        Self(Some(Arc::new(user)))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn is_authorized(&self) -> bool {
        self.0.is_some()
    }

    pub fn user(&self) -> Option<&Arc<AuthenticatedUser>> {
        self.0.as_ref()
    }

    pub fn has_role(&self, role: &RoleKey) -> bool {
        self.0.as_ref().is_some_and(|u| u.has_role(role))
    }

    pub fn has_permission(&self, permission: &PermissionKey) -> bool {
        self.0.as_ref().is_some_and(|u| u.has_permission(permission))
    }
}
