// src/tenancy.rs

//! Organization membership: which tenants a user belongs to and which one is
//! selected.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Membership, Organization};
use crate::rbac::PermissionGraph;
use crate::repository::{MembershipRepository, OrganizationRepository};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("already working in this organization")]
    SameOrganization,
    #[error("not a member of this organization")]
    NotMember,
    #[error(transparent)]
    Store(StoreError),
}

/// Selected membership together with its (active) organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveMembership {
    pub membership: Membership,
    pub organization: Organization,
}

pub struct OrganizationMembership<R> {
    repo: Arc<R>,
}

impl<R> Clone for OrganizationMembership<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<R> OrganizationMembership<R>
where
    R: MembershipRepository + OrganizationRepository,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    fn live_organization(&self, organization_id: i64) -> Result<Option<Organization>, StoreError> {
        Ok(self
            .repo
            .find_organization(organization_id)?
            .filter(|org| org.is_active))
    }

    /// The selected, live membership of the user, if its organization is active.
    pub fn active_membership_of(&self, user_id: i64) -> Result<Option<ActiveMembership>, StoreError> {
        for membership in self.repo.memberships_of(user_id)? {
            if !membership.is_selected() {
                continue;
            }
            return Ok(self
                .live_organization(membership.organization_id)?
                .map(|organization| ActiveMembership {
                    membership,
                    organization,
                }));
        }
        Ok(None)
    }

    pub fn membership_of(&self, user_id: i64, organization_id: i64) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .repo
            .find_membership(user_id, organization_id)?
            .filter(|m| m.is_active))
    }

    /// The organization a token is scoped to, provided the user's membership
    /// there is live and selected and the organization is active.
    pub fn selected_organization(&self, user_id: i64, organization_id: i64) -> Result<Option<Organization>, StoreError> {
        match self.repo.find_membership(user_id, organization_id)? {
            Some(m) if m.is_selected() => self.live_organization(organization_id),
            _ => Ok(None),
        }
    }

    // Ordered by organization id.
    pub fn memberships(&self, user_id: i64) -> Result<Vec<ActiveMembership>, StoreError> {
        let mut out = Vec::new();
        for membership in self.repo.memberships_of(user_id)? {
            if !membership.is_active {
                continue;
            }
            if let Some(organization) = self.live_organization(membership.organization_id)? {
                out.push(ActiveMembership {
                    membership,
                    organization,
                });
            }
        }
        Ok(out)
    }

    /// The selected membership, or failing that the lowest-id live one,
    /// which gets selected.
    pub fn select_default(&self, user_id: i64) -> Result<Option<ActiveMembership>, StoreError> {
        if let Some(active) = self.active_membership_of(user_id)? {
            return Ok(Some(active));
        }
        let Some(candidate) = self.memberships(user_id)?.into_iter().next() else {
            return Ok(None);
        };
        let membership =
            self.repo
                .activate_membership(user_id, candidate.organization.id, false)?;
        tracing::info!(
            user_id,
            organization_id = candidate.organization.id,
            "selected default organization"
        );
        Ok(Some(ActiveMembership {
            membership,
            organization: candidate.organization,
        }))
    }

    /// Selects `to` and demotes `from` (and any other selection) atomically.
    ///
    /// A user without a live row in `to` may only enter it when holding the
    /// super-role; the row is then provisioned. Any failure leaves every
    /// membership untouched.
    pub fn switch_active(
        &self,
        user_id: i64,
        from: i64,
        to: i64,
        permissions: &PermissionGraph,
    ) -> Result<ActiveMembership, SwitchError> {
        if from == to {
            return Err(SwitchError::SameOrganization);
        }

        let Some(organization) = self.live_organization(to).map_err(SwitchError::Store)? else {
            tracing::warn!(user_id, from, to, "organization switch refused: organization is not active");
            return Err(SwitchError::NotMember);
        };

        let existing = self.membership_of(user_id, to).map_err(SwitchError::Store)?;
        let provision = existing.is_none();
        if provision && !permissions.is_super() {
            tracing::warn!(user_id, from, to, "organization switch refused: not a member");
            return Err(SwitchError::NotMember);
        }

        let membership = self
            .repo
            .activate_membership(user_id, to, provision)
            .map_err(|e| match e {
                StoreError::NotFound(what) => {
                    tracing::warn!(user_id, from, to, %what, "organization switch refused");
                    SwitchError::NotMember
                }
                other => SwitchError::Store(other),
            })?;

        tracing::info!(user_id, from, to, provisioned = provision, "organization switched");
        Ok(ActiveMembership {
            membership,
            organization,
        })
    }

    pub fn add_member(&self, user_id: i64, organization_id: i64) -> Result<Membership, StoreError> {
        let membership = self.repo.add_membership(user_id, organization_id)?;
        tracing::info!(user_id, organization_id, "member added");
        Ok(membership)
    }

    pub fn remove_member(&self, user_id: i64, organization_id: i64) -> Result<Membership, StoreError> {
        let membership = self.repo.remove_membership(user_id, organization_id)?;
        tracing::info!(user_id, organization_id, "member removed");
        Ok(membership)
    }

    /// Deactivating an organization ends every session scoped to it at the
    /// next request.
    pub fn set_organization_active(&self, organization_id: i64, active: bool) -> Result<Organization, StoreError> {
        let org = self.repo.set_organization_active(organization_id, active)?;
        tracing::info!(organization_id, active, "organization status changed");
        Ok(org)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alias, MembershipStatus, NewOrganization, NewUser, PasswordHash, RoleKey};
    use crate::repository::UserRepository;
    use crate::store::AuthStore;

    struct Fixture {
        store: Arc<AuthStore>,
        tenancy: OrganizationMembership<AuthStore>,
        user: i64,
        a: i64,
        b: i64,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(AuthStore::in_memory());
        let user = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: PasswordHash::new_bcrypt_with_cost("pw", 4).unwrap(),
                language: "en".into(),
            })
            .unwrap()
            .id;
        let org = |name: &str| {
            store
                .create_organization(NewOrganization {
                    name: name.into(),
                    parent_id: None,
                    alias: Alias::new("clinic").unwrap(),
                })
                .unwrap()
                .id
        };
        let (a, b) = (org("A"), org("B"));
        let tenancy = OrganizationMembership::new(store.clone());
        tenancy.add_member(user, a).unwrap();
        tenancy.repo.activate_membership(user, a, false).unwrap();
        Fixture {
            store,
            tenancy,
            user,
            a,
            b,
        }
    }

    fn statuses(f: &Fixture) -> Vec<(i64, MembershipStatus)> {
        f.store
            .memberships_of(f.user)
            .unwrap()
            .into_iter()
            .map(|m| (m.organization_id, m.status))
            .collect()
    }

    #[test]
    fn switch_promotes_target_and_demotes_previous() {
        let f = fixture();
        f.tenancy.add_member(f.user, f.b).unwrap();

        f.tenancy
            .switch_active(f.user, f.a, f.b, &PermissionGraph::default())
            .unwrap();
        assert_eq!(
            statuses(&f),
            vec![(f.a, MembershipStatus::Pending), (f.b, MembershipStatus::Active)]
        );

        f.tenancy
            .switch_active(f.user, f.b, f.a, &PermissionGraph::default())
            .unwrap();
        assert_eq!(
            statuses(&f),
            vec![(f.a, MembershipStatus::Active), (f.b, MembershipStatus::Pending)]
        );
    }

    #[test]
    fn non_member_switch_fails_without_side_effects() {
        let f = fixture();
        let before = statuses(&f);
        let err = f
            .tenancy
            .switch_active(f.user, f.a, f.b, &PermissionGraph::default())
            .unwrap_err();
        assert!(matches!(err, SwitchError::NotMember));
        assert_eq!(statuses(&f), before);
    }

    #[test]
    fn same_organization_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.tenancy.switch_active(f.user, f.a, f.a, &PermissionGraph::default()),
            Err(SwitchError::SameOrganization)
        ));
    }

    #[test]
    fn super_role_provisions_missing_membership() {
        let f = fixture();
        let coder = PermissionGraph::from_roles([(RoleKey::super_role(), Vec::new())]);
        f.tenancy.switch_active(f.user, f.a, f.b, &coder).unwrap();

        let active = f.tenancy.active_membership_of(f.user).unwrap().unwrap();
        assert_eq!(active.organization.id, f.b);
        assert_eq!(
            statuses(&f),
            vec![(f.a, MembershipStatus::Pending), (f.b, MembershipStatus::Active)]
        );
    }

    #[test]
    fn inactive_target_organization_counts_as_not_member() {
        let f = fixture();
        f.tenancy.add_member(f.user, f.b).unwrap();
        f.tenancy.set_organization_active(f.b, false).unwrap();
        assert!(matches!(
            f.tenancy.switch_active(f.user, f.a, f.b, &PermissionGraph::default()),
            Err(SwitchError::NotMember)
        ));
    }

    #[test]
    fn deactivated_organization_is_not_selected() {
        let f = fixture();
        assert!(f.tenancy.selected_organization(f.user, f.a).unwrap().is_some());
        f.tenancy.set_organization_active(f.a, false).unwrap();
        assert!(f.tenancy.selected_organization(f.user, f.a).unwrap().is_none());
        assert!(f.tenancy.active_membership_of(f.user).unwrap().is_none());
    }

    #[test]
    fn default_selection_falls_back_to_lowest_live_membership() {
        let f = fixture();
        f.tenancy.add_member(f.user, f.b).unwrap();
        f.tenancy.remove_member(f.user, f.a).unwrap();

        let chosen = f.tenancy.select_default(f.user).unwrap().unwrap();
        assert_eq!(chosen.organization.id, f.b);
        assert!(chosen.membership.is_selected());
    }

    #[test]
    fn back_to_back_switches_leave_one_selection() {
        let f = fixture();
        let c = f
            .store
            .create_organization(NewOrganization {
                name: "C".into(),
                parent_id: None,
                alias: Alias::new("clinic").unwrap(),
            })
            .unwrap()
            .id;
        f.tenancy.add_member(f.user, f.b).unwrap();
        f.tenancy.add_member(f.user, c).unwrap();

        let none = PermissionGraph::default();
        f.tenancy.switch_active(f.user, f.a, f.b, &none).unwrap();
        f.tenancy.switch_active(f.user, f.a, c, &none).unwrap();

        let selected: Vec<_> = statuses(&f)
            .into_iter()
            .filter(|(_, s)| *s == MembershipStatus::Active)
            .collect();
        assert_eq!(selected, vec![(c, MembershipStatus::Active)]);
    }

    #[test]
    fn concurrent_switches_never_select_two() {
        let f = fixture();
        f.tenancy.add_member(f.user, f.b).unwrap();

        std::thread::scope(|scope| {
            for i in 0..8 {
                let tenancy = f.tenancy.clone();
                let (user, a, b) = (f.user, f.a, f.b);
                scope.spawn(move || {
                    let none = PermissionGraph::default();
                    let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                    let _ = tenancy.switch_active(user, from, to, &none);
                });
            }
        });

        let selected = statuses(&f)
            .into_iter()
            .filter(|(_, s)| *s == MembershipStatus::Active)
            .count();
        assert_eq!(selected, 1);
    }

    #[test]
    fn racing_switches_report_their_own_target() {
        let f = fixture();
        f.tenancy.add_member(f.user, f.b).unwrap();

        let results: Vec<(i64, Result<ActiveMembership, SwitchError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let tenancy = f.tenancy.clone();
                    let (user, a, b) = (f.user, f.a, f.b);
                    scope.spawn(move || {
                        let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                        (to, tenancy.switch_active(user, from, to, &PermissionGraph::default()))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (to, result) in results {
            let active = result.unwrap();
            assert_eq!(active.organization.id, to);
            assert_eq!(active.membership.organization_id, to);
            assert!(active.membership.is_selected());
        }
    }
}
