// src/store.rs

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::well_known::{BOOTSTRAP_USER_ID, DEFAULT_LANGUAGE, SYSTEM_ORGANIZATION_ID, SYSTEM_ORGANIZATION_NAME};
use crate::models::*;
use crate::raddb::{KvRead, MasterKey, RadDB, RadDbError, Transaction};
use crate::repository::{
    MembershipRepository, OrganizationRepository, RbacRepository, UserRepository,
};

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DB error: {0}")]
    Db(#[from] RadDbError),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Protected: {0}")]
    Protected(String),
}

impl From<KeyError> for StoreError {
    fn from(e: KeyError) -> Self {
        StoreError::InvalidInput(e.to_string())
    }
}

// === Keys ===

mod keys {
    use crate::models::{Alias, PermissionKey, RoleKey};

    pub fn seq(kind: &str) -> String {
        format!("seq:{}", kind)
    }
    pub fn user(id: i64) -> String {
        format!("user:{}", id)
    }
    pub fn username_index(username: &str) -> String {
        format!("username_index:{}", username.to_lowercase())
    }
    pub fn email_index(email: &str) -> String {
        format!("email_index:{}", email.to_lowercase())
    }
    pub fn organization(id: i64) -> String {
        format!("org:{}", id)
    }
    pub fn membership(user_id: i64, organization_id: i64) -> String {
        format!("membership:{}:{}", user_id, organization_id)
    }
    pub fn user_memberships(user_id: i64) -> String {
        format!("user_memberships:{}", user_id)
    }
    pub fn role(key: &RoleKey) -> String {
        format!("role:{}", key)
    }
    pub fn alias_roles(alias: &Alias) -> String {
        format!("alias_roles:{}", alias)
    }
    pub fn permission(key: &PermissionKey) -> String {
        format!("permission:{}", key)
    }
    pub fn user_roles(user_id: i64) -> String {
        format!("user_roles:{}", user_id)
    }
    pub fn role_permissions(key: &RoleKey) -> String {
        format!("role_permissions:{}", key)
    }
}

fn load<T: DeserializeOwned>(kv: &impl KvRead, key: &str) -> Result<Option<T>, StoreError> {
    match kv.get_raw(key) {
        Some(data) => bincode::deserialize(&data)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

fn store<T: Serialize>(
    tx: &mut Transaction<'_>,
    key: impl Into<String>,
    value: &T,
) -> Result<(), StoreError> {
    let data = bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    tx.put(key, data);
    Ok(())
}

/// Ids 1 are reserved for the bootstrap records; regular allocation starts at 2.
fn next_id(tx: &mut Transaction<'_>, kind: &str) -> Result<i64, StoreError> {
    let last: i64 = load(tx, &keys::seq(kind))?.unwrap_or(0);
    let id = last.max(1) + 1;
    store(tx, keys::seq(kind), &id)?;
    Ok(id)
}

fn load_organization(kv: &impl KvRead, id: i64) -> Result<Organization, StoreError> {
    load(kv, &keys::organization(id))?
        .ok_or_else(|| StoreError::NotFound(format!("organization {}", id)))
}

fn load_user(kv: &impl KvRead, id: i64) -> Result<User, StoreError> {
    load(kv, &keys::user(id))?.ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
}

fn index_membership(tx: &mut Transaction<'_>, user_id: i64, organization_id: i64) -> Result<(), StoreError> {
    let mut orgs: Vec<i64> = load(tx, &keys::user_memberships(user_id))?.unwrap_or_default();
    if !orgs.contains(&organization_id) {
        orgs.push(organization_id);
        orgs.sort_unstable();
        store(tx, keys::user_memberships(user_id), &orgs)?;
    }
    Ok(())
}

fn select_membership(
    tx: &mut Transaction<'_>,
    user_id: i64,
    organization_id: i64,
    provision: bool,
) -> Result<Membership, StoreError> {
    let org = load_organization(tx, organization_id)?;
    if !org.is_active {
        return Err(StoreError::NotFound(format!("active organization {}", organization_id)));
    }

    let now = Utc::now();
    let mut target = match load::<Membership>(tx, &keys::membership(user_id, organization_id))? {
        Some(m) if m.is_active => m,
        Some(mut m) if provision => {
            m.is_active = true;
            m
        }
        None if provision => {
            load_user(tx, user_id)?;
            Membership::new(user_id, organization_id, MembershipStatus::Pending)
        }
        _ => {
            return Err(StoreError::NotFound(format!(
                "membership of user {} in organization {}",
                user_id, organization_id
            )));
        }
    };

    let orgs: Vec<i64> = load(tx, &keys::user_memberships(user_id))?.unwrap_or_default();
    for other_org in orgs.into_iter().filter(|id| *id != organization_id) {
        let key = keys::membership(user_id, other_org);
        if let Some(mut other) = load::<Membership>(tx, &key)? {
            if other.status == MembershipStatus::Active {
                other.status = MembershipStatus::Pending;
                other.updated_at = now;
                store(tx, key, &other)?;
            }
        }
    }

    target.status = MembershipStatus::Active;
    target.updated_at = now;
    store(tx, keys::membership(user_id, organization_id), &target)?;
    index_membership(tx, user_id, organization_id)?;
    Ok(target)
}

/// Outcome of [`AuthStore::bootstrap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub created_organization: bool,
    pub created_user: bool,
}

/// Persistent store behind every repository port.
#[derive(Clone)]
pub struct AuthStore {
    db: Arc<RadDB>,
}

impl AuthStore {
    pub fn open<P: AsRef<Path>>(path: P, key: &MasterKey) -> Result<Self, StoreError> {
        Ok(Self {
            db: Arc::new(RadDB::open(path, key)?),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            db: Arc::new(RadDB::in_memory()),
        }
    }

    /// Seeds the system organization, the super-role and the bootstrap user.
    /// Safe to run repeatedly; existing records are kept.
    pub fn bootstrap(
        &self,
        username: &str,
        email: &str,
        password_hash: PasswordHash,
    ) -> Result<BootstrapReport, StoreError> {
        user::validate_username(username).map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        user::validate_email(email).map_err(|e| StoreError::InvalidInput(e.to_string()))?;

        self.db.transaction(|tx| {
            let now = Utc::now();
            let mut report = BootstrapReport {
                created_organization: false,
                created_user: false,
            };

            // System organization
            if !tx.contains_key(&keys::organization(SYSTEM_ORGANIZATION_ID)) {
                let org = Organization {
                    id: SYSTEM_ORGANIZATION_ID,
                    name: SYSTEM_ORGANIZATION_NAME.to_string(),
                    parent_id: None,
                    alias: Alias::system(),
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                store(tx, keys::organization(org.id), &org)?;
                report.created_organization = true;
            }

            let super_role = RoleKey::super_role();
            if !tx.contains_key(&keys::role(&super_role)) {
                insert_role(tx, super_role.clone(), Some("Bypasses every permission check".into()))?;
            }

            // Bootstrap user, granted the super-role once
            if !tx.contains_key(&keys::user(BOOTSTRAP_USER_ID)) {
                if tx.contains_key(&keys::username_index(username)) {
                    return Err(StoreError::AlreadyExists(format!("username {}", username)));
                }
                if tx.contains_key(&keys::email_index(email)) {
                    return Err(StoreError::AlreadyExists(format!("email {}", email)));
                }
                let user = User {
                    id: BOOTSTRAP_USER_ID,
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash,
                    is_active: true,
                    language: DEFAULT_LANGUAGE.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                store(tx, keys::user(user.id), &user)?;
                store(tx, keys::username_index(&user.username), &user.id)?;
                store(tx, keys::email_index(&user.email), &user.id)?;
                report.created_user = true;
                assign_role(tx, BOOTSTRAP_USER_ID, &super_role, true)?;
            }

            // Membership in the system organization
            let has_selection = has_selected_membership(tx, BOOTSTRAP_USER_ID)?;
            if !has_selection {
                select_membership(tx, BOOTSTRAP_USER_ID, SYSTEM_ORGANIZATION_ID, true)?;
            } else {
                let key = keys::membership(BOOTSTRAP_USER_ID, SYSTEM_ORGANIZATION_ID);
                if load::<Membership>(tx, &key)?.is_none() {
                    store(tx, key, &Membership::new(BOOTSTRAP_USER_ID, SYSTEM_ORGANIZATION_ID, MembershipStatus::Pending))?;
                    index_membership(tx, BOOTSTRAP_USER_ID, SYSTEM_ORGANIZATION_ID)?;
                }
            }

            Ok(report)
        })
    }
}

fn has_selected_membership(kv: &impl KvRead, user_id: i64) -> Result<bool, StoreError> {
    let orgs: Vec<i64> = load(kv, &keys::user_memberships(user_id))?.unwrap_or_default();
    for org in orgs {
        let membership: Option<Membership> = load(kv, &keys::membership(user_id, org))?;
        if membership.is_some_and(|m| m.is_selected()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn insert_role(tx: &mut Transaction<'_>, key: RoleKey, description: Option<String>) -> Result<Role, StoreError> {
    let role = Role {
        key,
        description,
        is_active: true,
        created_at: Utc::now(),
    };
    store(tx, keys::role(&role.key), &role)?;
    let mut names: Vec<String> = load(tx, &keys::alias_roles(&role.key.alias))?.unwrap_or_default();
    if !names.contains(&role.key.name) {
        names.push(role.key.name.clone());
        store(tx, keys::alias_roles(&role.key.alias), &names)?;
    }
    Ok(role)
}

fn assign_role(tx: &mut Transaction<'_>, user_id: i64, role: &RoleKey, active: bool) -> Result<(), StoreError> {
    let mut assignments: Vec<UserRole> = load(tx, &keys::user_roles(user_id))?.unwrap_or_default();
    let now = Utc::now();
    match assignments.iter_mut().find(|a| &a.role == role) {
        Some(existing) => {
            existing.is_active = active;
            existing.updated_at = now;
        }
        None if active => assignments.push(UserRole {
            user_id,
            role: role.clone(),
            is_active: true,
            updated_at: now,
        }),
        None => return Ok(()),
    }
    store(tx, keys::user_roles(user_id), &assignments)
}

// === USERS ===

impl UserRepository for AuthStore {
    fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        user::validate_username(&new_user.username).map_err(|e| StoreError::InvalidInput(e.to_string()))?;
        user::validate_email(&new_user.email).map_err(|e| StoreError::InvalidInput(e.to_string()))?;

        self.db.transaction(|tx| {
            // Uniqueness of username and email
            if tx.contains_key(&keys::username_index(&new_user.username)) {
                return Err(StoreError::AlreadyExists(format!(
                    "User with username {} already exists",
                    new_user.username
                )));
            }
            if tx.contains_key(&keys::email_index(&new_user.email)) {
                return Err(StoreError::AlreadyExists(format!(
                    "User with email {} already exists",
                    new_user.email
                )));
            }

            let now = Utc::now();
            let user = User {
                id: next_id(tx, "user")?,
                username: new_user.username,
                email: new_user.email,
                password_hash: new_user.password_hash,
                is_active: true,
                language: new_user.language,
                created_at: now,
                updated_at: now,
            };
            store(tx, keys::user(user.id), &user)?;
            // Indexes: username → user_id, email → user_id
            store(tx, keys::username_index(&user.username), &user.id)?;
            store(tx, keys::email_index(&user.email), &user.id)?;
            Ok(user)
        })
    }

    fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.db.view(|v| load(v, &keys::user(id)))?
    }

    fn find_user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let login = login.trim();
        if login.is_empty() {
            return Ok(None);
        }
        self.db.view(|v| {
            let id: Option<i64> = match load(v, &keys::username_index(login))? {
                Some(id) => Some(id),
                None => load(v, &keys::email_index(login))?,
            };
            match id {
                Some(id) => load(v, &keys::user(id)),
                None => Ok(None),
            }
        })?
    }

    fn set_user_active(&self, id: i64, active: bool) -> Result<User, StoreError> {
        self.db.transaction(|tx| {
            let mut user = load_user(tx, id)?;
            user.is_active = active;
            user.updated_at = Utc::now();
            store(tx, keys::user(id), &user)?;
            Ok(user)
        })
    }
}

// === ORGANIZATIONS ===

impl OrganizationRepository for AuthStore {
    fn create_organization(&self, new_org: NewOrganization) -> Result<Organization, StoreError> {
        let name = new_org.name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("organization name is empty".into()));
        }

        self.db.transaction(|tx| {
            if let Some(parent_id) = new_org.parent_id {
                load_organization(tx, parent_id)?;
            }
            let now = Utc::now();
            let org = Organization {
                id: next_id(tx, "organization")?,
                name,
                parent_id: new_org.parent_id,
                alias: new_org.alias,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            store(tx, keys::organization(org.id), &org)?;
            Ok(org)
        })
    }

    fn find_organization(&self, id: i64) -> Result<Option<Organization>, StoreError> {
        self.db.view(|v| load(v, &keys::organization(id)))?
    }

    fn set_organization_active(&self, id: i64, active: bool) -> Result<Organization, StoreError> {
        if id == SYSTEM_ORGANIZATION_ID && !active {
            return Err(StoreError::Protected("the system organization cannot be deactivated".into()));
        }
        self.db.transaction(|tx| {
            let mut org = load_organization(tx, id)?;
            org.is_active = active;
            org.updated_at = Utc::now();
            store(tx, keys::organization(id), &org)?;
            Ok(org)
        })
    }
}

// === MEMBERSHIPS ===

impl MembershipRepository for AuthStore {
    fn memberships_of(&self, user_id: i64) -> Result<Vec<Membership>, StoreError> {
        self.db.view(|v| {
            let orgs: Vec<i64> = load(v, &keys::user_memberships(user_id))?.unwrap_or_default();
            let mut memberships = Vec::with_capacity(orgs.len());
            for org in orgs {
                if let Some(m) = load(v, &keys::membership(user_id, org))? {
                    memberships.push(m);
                }
            }
            Ok(memberships)
        })?
    }

    fn find_membership(&self, user_id: i64, organization_id: i64) -> Result<Option<Membership>, StoreError> {
        self.db.view(|v| load(v, &keys::membership(user_id, organization_id)))?
    }

    fn add_membership(&self, user_id: i64, organization_id: i64) -> Result<Membership, StoreError> {
        self.db.transaction(|tx| {
            load_user(tx, user_id)?;
            load_organization(tx, organization_id)?;

            let key = keys::membership(user_id, organization_id);
            let membership = match load::<Membership>(tx, &key)? {
                Some(existing) if existing.is_active => {
                    return Err(StoreError::AlreadyExists(format!(
                        "user {} is already a member of organization {}",
                        user_id, organization_id
                    )));
                }
                Some(mut revived) => {
                    revived.is_active = true;
                    revived.status = MembershipStatus::Pending;
                    revived.updated_at = Utc::now();
                    revived
                }
                None => Membership::new(user_id, organization_id, MembershipStatus::Pending),
            };
            store(tx, key, &membership)?;
            index_membership(tx, user_id, organization_id)?;
            Ok(membership)
        })
    }

    fn remove_membership(&self, user_id: i64, organization_id: i64) -> Result<Membership, StoreError> {
        self.db.transaction(|tx| {
            let key = keys::membership(user_id, organization_id);
            let mut membership: Membership = load(tx, &key)?.ok_or_else(|| {
                StoreError::NotFound(format!(
                    "membership of user {} in organization {}",
                    user_id, organization_id
                ))
            })?;
            membership.is_active = false;
            membership.status = MembershipStatus::Pending;
            membership.updated_at = Utc::now();
            store(tx, key, &membership)?;
            Ok(membership)
        })
    }

    fn activate_membership(&self, user_id: i64, organization_id: i64, provision: bool) -> Result<Membership, StoreError> {
        self.db.transaction(|tx| select_membership(tx, user_id, organization_id, provision))
    }
}

// === ROLES AND PERMISSIONS ===

impl RbacRepository for AuthStore {
    fn create_role(&self, key: RoleKey, description: Option<String>) -> Result<Role, StoreError> {
        self.db.transaction(|tx| {
            if tx.contains_key(&keys::role(&key)) {
                return Err(StoreError::AlreadyExists(format!("role {}", key)));
            }
            insert_role(tx, key, description)
        })
    }

    fn create_permission(&self, key: PermissionKey, module: String) -> Result<Permission, StoreError> {
        self.db.transaction(|tx| {
            if tx.contains_key(&keys::permission(&key)) {
                return Err(StoreError::AlreadyExists(format!("permission {}", key)));
            }
            let permission = Permission {
                key,
                module,
                is_active: true,
                created_at: Utc::now(),
            };
            store(tx, keys::permission(&permission.key), &permission)?;
            Ok(permission)
        })
    }

    fn set_role_permission(&self, role: &RoleKey, permission: &PermissionKey, active: bool) -> Result<(), StoreError> {
        if role.alias != permission.alias {
            return Err(StoreError::InvalidInput(format!(
                "permission {} does not belong to alias {}",
                permission, role.alias
            )));
        }
        self.db.transaction(|tx| {
            if !tx.contains_key(&keys::role(role)) {
                return Err(StoreError::NotFound(format!("role {}", role)));
            }
            if !tx.contains_key(&keys::permission(permission)) {
                return Err(StoreError::NotFound(format!("permission {}", permission)));
            }

            let mut grants: Vec<RolePermission> = load(tx, &keys::role_permissions(role))?.unwrap_or_default();
            let now = Utc::now();
            match grants.iter_mut().find(|g| &g.permission == permission) {
                Some(existing) => {
                    existing.is_active = active;
                    existing.updated_at = now;
                }
                None if active => grants.push(RolePermission {
                    role: role.clone(),
                    permission: permission.clone(),
                    is_active: true,
                    updated_at: now,
                }),
                None => return Ok(()),
            }
            store(tx, keys::role_permissions(role), &grants)
        })
    }

    fn set_user_role(&self, user_id: i64, role: &RoleKey, active: bool) -> Result<(), StoreError> {
        self.db.transaction(|tx| {
            load_user(tx, user_id)?;
            if !tx.contains_key(&keys::role(role)) {
                return Err(StoreError::NotFound(format!("role {}", role)));
            }
            assign_role(tx, user_id, role, active)
        })
    }

    fn roles_of(&self, user_id: i64) -> Result<Vec<RoleKey>, StoreError> {
        self.db.view(|v| {
            let assignments: Vec<UserRole> = load(v, &keys::user_roles(user_id))?.unwrap_or_default();
            let mut roles = Vec::with_capacity(assignments.len());
            for assignment in assignments.into_iter().filter(|a| a.is_active) {
                let role: Option<Role> = load(v, &keys::role(&assignment.role))?;
                if role.is_some_and(|r| r.is_active) {
                    roles.push(assignment.role);
                }
            }
            Ok(roles)
        })?
    }

    fn permissions_of(&self, role: &RoleKey) -> Result<Vec<PermissionKey>, StoreError> {
        self.db.view(|v| {
            let grants: Vec<RolePermission> = load(v, &keys::role_permissions(role))?.unwrap_or_default();
            let mut permissions = Vec::with_capacity(grants.len());
            for grant in grants
                .into_iter()
                .filter(|g| g.is_active && g.permission.alias == role.alias)
            {
                let permission: Option<Permission> = load(v, &keys::permission(&grant.permission))?;
                if permission.is_some_and(|p| p.is_active) {
                    permissions.push(grant.permission);
                }
            }
            Ok(permissions)
        })?
    }

    fn roles_for_alias(&self, alias: &Alias) -> Result<Vec<Role>, StoreError> {
        self.db.view(|v| {
            let names: Vec<String> = load(v, &keys::alias_roles(alias))?.unwrap_or_default();
            let mut roles = Vec::with_capacity(names.len());
            for name in names {
                let key = RoleKey::new(alias.clone(), name)?;
                if let Some(role) = load(v, &keys::role(&key))? {
                    roles.push(role);
                }
            }
            Ok(roles)
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> PasswordHash {
        PasswordHash::new_bcrypt_with_cost("pw", 4).unwrap()
    }

    fn new_user(store: &AuthStore, username: &str) -> User {
        store
            .create_user(NewUser {
                username: username.into(),
                email: format!("{}@example.com", username),
                password_hash: hash(),
                language: "en".into(),
            })
            .unwrap()
    }

    fn new_org(store: &AuthStore, name: &str) -> Organization {
        store
            .create_organization(NewOrganization {
                name: name.into(),
                parent_id: None,
                alias: Alias::new("clinic").unwrap(),
            })
            .unwrap()
    }

    fn selected(store: &AuthStore, user_id: i64) -> Vec<i64> {
        store
            .memberships_of(user_id)
            .unwrap()
            .into_iter()
            .filter(|m| m.status == MembershipStatus::Active)
            .map(|m| m.organization_id)
            .collect()
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let store = AuthStore::in_memory();
        let first = store.bootstrap("root", "root@example.com", hash()).unwrap();
        assert!(first.created_organization && first.created_user);

        let second = store.bootstrap("root", "root@example.com", hash()).unwrap();
        assert!(!second.created_organization && !second.created_user);

        assert_eq!(store.roles_of(BOOTSTRAP_USER_ID).unwrap(), vec![RoleKey::super_role()]);
        assert_eq!(selected(&store, BOOTSTRAP_USER_ID), vec![SYSTEM_ORGANIZATION_ID]);
    }

    #[test]
    fn rerunning_bootstrap_keeps_a_revoked_super_role_revoked() {
        let store = AuthStore::in_memory();
        store.bootstrap("root", "root@example.com", hash()).unwrap();
        store.set_user_role(BOOTSTRAP_USER_ID, &RoleKey::super_role(), false).unwrap();

        store.bootstrap("root", "root@example.com", hash()).unwrap();
        assert!(store.roles_of(BOOTSTRAP_USER_ID).unwrap().is_empty());
    }

    #[test]
    fn regular_ids_skip_reserved_bootstrap_ids() {
        let store = AuthStore::in_memory();
        let user = new_user(&store, "alice");
        let org = new_org(&store, "North");
        assert_eq!(user.id, 2);
        assert_eq!(org.id, 2);
    }

    #[test]
    fn usernames_and_emails_are_unique_case_insensitively() {
        let store = AuthStore::in_memory();
        new_user(&store, "alice");
        let err = store.create_user(NewUser {
            username: "ALICE".into(),
            email: "other@example.com".into(),
            password_hash: hash(),
            language: "en".into(),
        });
        assert!(matches!(err, Err(StoreError::AlreadyExists(_))));

        let found = store.find_user_by_login("Alice@Example.com").unwrap().unwrap();
        assert_eq!(found.username, "alice");
    }

    #[test]
    fn activation_keeps_a_single_selected_membership() {
        let store = AuthStore::in_memory();
        let user = new_user(&store, "alice");
        let a = new_org(&store, "A");
        let b = new_org(&store, "B");
        store.add_membership(user.id, a.id).unwrap();
        store.add_membership(user.id, b.id).unwrap();

        store.activate_membership(user.id, a.id, false).unwrap();
        store.activate_membership(user.id, b.id, false).unwrap();
        store.activate_membership(user.id, a.id, false).unwrap();
        assert_eq!(selected(&store, user.id), vec![a.id]);
    }

    #[test]
    fn activation_without_row_or_provision_changes_nothing() {
        let store = AuthStore::in_memory();
        let user = new_user(&store, "alice");
        let a = new_org(&store, "A");
        let b = new_org(&store, "B");
        store.add_membership(user.id, a.id).unwrap();
        store.activate_membership(user.id, a.id, false).unwrap();

        let err = store.activate_membership(user.id, b.id, false);
        assert!(matches!(err, Err(StoreError::NotFound(_))));
        assert_eq!(selected(&store, user.id), vec![a.id]);
        assert!(store.find_membership(user.id, b.id).unwrap().is_none());
    }

    #[test]
    fn provisioning_creates_and_selects_the_row() {
        let store = AuthStore::in_memory();
        let user = new_user(&store, "alice");
        let a = new_org(&store, "A");
        store.activate_membership(user.id, a.id, true).unwrap();
        let m = store.find_membership(user.id, a.id).unwrap().unwrap();
        assert!(m.is_selected());
    }

    #[test]
    fn removed_membership_can_be_revived_as_pending() {
        let store = AuthStore::in_memory();
        let user = new_user(&store, "alice");
        let a = new_org(&store, "A");
        store.add_membership(user.id, a.id).unwrap();
        store.activate_membership(user.id, a.id, false).unwrap();

        let removed = store.remove_membership(user.id, a.id).unwrap();
        assert!(!removed.is_active);
        assert!(store.activate_membership(user.id, a.id, false).is_err());

        let revived = store.add_membership(user.id, a.id).unwrap();
        assert!(revived.is_active);
        assert_eq!(revived.status, MembershipStatus::Pending);
        assert!(matches!(store.add_membership(user.id, a.id), Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn system_organization_cannot_be_deactivated() {
        let store = AuthStore::in_memory();
        store.bootstrap("root", "root@example.com", hash()).unwrap();
        assert!(matches!(
            store.set_organization_active(SYSTEM_ORGANIZATION_ID, false),
            Err(StoreError::Protected(_))
        ));
    }

    #[test]
    fn grants_must_share_the_role_alias() {
        let store = AuthStore::in_memory();
        let role = RoleKey::new(Alias::new("clinic").unwrap(), "manager").unwrap();
        let foreign = PermissionKey::new(Alias::new("lab").unwrap(), "report_view").unwrap();
        store.create_role(role.clone(), None).unwrap();
        store.create_permission(foreign.clone(), "Reports".into()).unwrap();
        assert!(matches!(
            store.set_role_permission(&role, &foreign, true),
            Err(StoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn roles_are_listed_per_alias() {
        let store = AuthStore::in_memory();
        let clinic = Alias::new("clinic").unwrap();
        for name in ["manager", "viewer"] {
            store.create_role(RoleKey::new(clinic.clone(), name).unwrap(), None).unwrap();
        }
        store
            .create_role(RoleKey::new(Alias::new("lab").unwrap(), "manager").unwrap(), None)
            .unwrap();

        let names: Vec<String> = store
            .roles_for_alias(&clinic)
            .unwrap()
            .into_iter()
            .map(|r| r.key.to_string())
            .collect();
        assert_eq!(names, vec!["clinic_manager", "clinic_viewer"]);
        assert!(store.roles_for_alias(&Alias::new("shop").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn soft_deleted_grants_and_assignments_are_ignored() {
        let store = AuthStore::in_memory();
        let user = new_user(&store, "alice");
        let clinic = Alias::new("clinic").unwrap();
        let role = RoleKey::new(clinic.clone(), "manager").unwrap();
        let perm = PermissionKey::new(clinic, "users_edit").unwrap();
        store.create_role(role.clone(), None).unwrap();
        store.create_permission(perm.clone(), "Users".into()).unwrap();
        store.set_role_permission(&role, &perm, true).unwrap();
        store.set_user_role(user.id, &role, true).unwrap();

        assert_eq!(store.permissions_of(&role).unwrap(), vec![perm.clone()]);
        assert_eq!(store.roles_of(user.id).unwrap(), vec![role.clone()]);

        store.set_role_permission(&role, &perm, false).unwrap();
        store.set_user_role(user.id, &role, false).unwrap();
        assert!(store.permissions_of(&role).unwrap().is_empty());
        assert!(store.roles_of(user.id).unwrap().is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.db");
        let key = RadDB::generate_key();
        {
            let store = AuthStore::open(&path, &key).unwrap();
            store.bootstrap("root", "root@example.com", hash()).unwrap();
        }
        let store = AuthStore::open(&path, &key).unwrap();
        let root = store.find_user_by_login("root").unwrap().unwrap();
        assert_eq!(root.id, BOOTSTRAP_USER_ID);
    }
}
