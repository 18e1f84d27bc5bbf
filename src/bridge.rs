// src/bridge.rs

//! Turns the token held in a session into an [`AuthenticatedUser`], and the
//! operations that put a token there in the first place.
//!
//! Per request the bridge walks `Unauthenticated -> TokenPresent -> Validated
//! -> Enriched`. Failing at any step yields a [`Rejected`] reason and never a
//! partially populated user. The HTTP adapter decides what to do with it.

use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthError, ConfigurationError, Subject, TokenCodec};
use crate::context::AuthenticatedUser;
use crate::models::{Organization, PasswordHash, UserProfile};
use crate::rbac::PermissionGraph;
use crate::repository::AuthRepository;
use crate::session::Session;
use crate::store::StoreError;
use crate::tenancy::{OrganizationMembership, SwitchError};

// ========================================
// Outcomes
// ========================================

/// Furthest state reached for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unauthenticated,
    TokenPresent,
    Validated,
    Enriched,
}

#[derive(Debug, Error)]
pub enum Rejected {
    #[error("no token in session")]
    NoToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] AuthError),
    #[error("user {0} does not exist or is inactive")]
    UserNotFound(i64),
    #[error("user {user_id} has no active membership in organization {organization_id}")]
    NotMember { user_id: i64, organization_id: i64 },
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl Rejected {
    /// State the request had reached when it was rejected.
    pub fn stage(&self) -> Stage {
        match self {
            Rejected::NoToken => Stage::Unauthenticated,
            Rejected::InvalidToken(_) => Stage::TokenPresent,
            Rejected::UserNotFound(_) | Rejected::NotMember { .. } | Rejected::Store(_) => {
                Stage::Validated
            }
        }
    }

    /// A storage failure says nothing about the token, so it is kept.
    pub fn discards_token(&self) -> bool {
        !matches!(self, Rejected::Store(_))
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("user is inactive")]
    InactiveUser,
    #[error("user does not belong to any organization")]
    NoOrganization,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for LoginError {
    fn from(e: StoreError) -> Self {
        LoginError::Internal(e.to_string())
    }
}

impl From<ConfigurationError> for LoginError {
    fn from(e: ConfigurationError) -> Self {
        LoginError::Internal(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SwitchFailed {
    #[error(transparent)]
    Switch(#[from] SwitchError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

// ========================================
// Bridge
// ========================================

pub struct AuthSessionBridge<R> {
    codec: Arc<TokenCodec>,
    repo: Arc<R>,
    memberships: OrganizationMembership<R>,
}

impl<R> Clone for AuthSessionBridge<R> {
    fn clone(&self) -> Self {
        Self {
            codec: self.codec.clone(),
            repo: self.repo.clone(),
            memberships: self.memberships.clone(),
        }
    }
}

impl<R: AuthRepository> AuthSessionBridge<R> {
    pub fn new(codec: Arc<TokenCodec>, repo: Arc<R>) -> Self {
        Self {
            codec,
            memberships: OrganizationMembership::new(repo.clone()),
            repo,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn memberships(&self) -> &OrganizationMembership<R> {
        &self.memberships
    }

    /// Revalidates the session's token. On rejection the token is removed
    /// from the session, except when storage failed.
    pub fn authenticate(&self, session: &Session) -> Result<AuthenticatedUser, Rejected> {
        match self.enrich(session) {
            Ok(user) => Ok(user),
            Err(reason) => {
                if reason.discards_token() {
                    session.clear_token();
                }
                match &reason {
                    Rejected::NoToken => tracing::debug!(session = %session.id(), "no token in session"),
                    Rejected::Store(e) => {
                        tracing::error!(session = %session.id(), error = %e, "authentication aborted by storage failure")
                    }
                    other => tracing::warn!(
                        session = %session.id(),
                        stage = ?other.stage(),
                        reason = %other,
                        "authentication rejected"
                    ),
                }
                Err(reason)
            }
        }
    }

    fn enrich(&self, session: &Session) -> Result<AuthenticatedUser, Rejected> {
        let token = session.token().ok_or(Rejected::NoToken)?;
        let claims = self.codec.validate(&token)?;

        let user = self
            .repo
            .find_user(claims.user_id)?
            .filter(|u| u.is_active)
            .ok_or(Rejected::UserNotFound(claims.user_id))?;

        let organization = self
            .memberships
            .selected_organization(user.id, claims.organization_id)?
            .ok_or(Rejected::NotMember {
                user_id: user.id,
                organization_id: claims.organization_id,
            })?;

        let permissions = PermissionGraph::resolve(self.repo.as_ref(), user.id)?;
        Ok(AuthenticatedUser::new(UserProfile::from(user), organization, permissions))
    }

    /// Verifies credentials and stores a fresh token scoped to the user's
    /// selected (or default) organization.
    pub fn login(&self, session: &Session, login: &str, password: &str) -> Result<AuthenticatedUser, LoginError> {
        let Some(user) = self.repo.find_user_by_login(login.trim())? else {
            PasswordHash::verify_dummy(password);
            tracing::warn!("login failed: unknown user");
            return Err(LoginError::InvalidCredentials);
        };

        match user.password_hash.verify(password) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id = user.id, "login failed: wrong password");
                return Err(LoginError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(user_id = user.id, error = %e, "login failed: unreadable password hash");
                return Err(LoginError::Internal(e.to_string()));
            }
        }

        if !user.is_active {
            tracing::warn!(user_id = user.id, "login refused: inactive user");
            return Err(LoginError::InactiveUser);
        }

        let Some(active) = self.memberships.select_default(user.id)? else {
            tracing::warn!(user_id = user.id, "login refused: no organization");
            return Err(LoginError::NoOrganization);
        };

        let subject = Subject {
            user_id: user.id,
            organization_id: active.organization.id,
        };
        let token = self.codec.issue(subject)?;
        let permissions = PermissionGraph::resolve(self.repo.as_ref(), user.id)?;
        session.set_token(token);

        tracing::info!(user_id = user.id, organization_id = subject.organization_id, "user logged in");
        Ok(AuthenticatedUser::new(UserProfile::from(user), active.organization, permissions))
    }

    /// Moves the caller to `target` and replaces the session's token with one
    /// scoped to it. On failure the session is left as it was.
    pub fn switch_organization(
        &self,
        session: &Session,
        current: &AuthenticatedUser,
        target: i64,
    ) -> Result<Organization, SwitchFailed> {
        let user_id = current.profile().id;
        let active = self.memberships.switch_active(
            user_id,
            current.organization().id,
            target,
            current.permissions(),
        )?;

        let token = self.codec.issue(Subject {
            user_id,
            organization_id: active.organization.id,
        })?;
        session.set_token(token);
        Ok(active.organization)
    }

    pub fn logout(&self, session: &Session) {
        session.destroy();
        tracing::info!(session = %session.id(), "session ended");
    }

    /// Long-lived token for the caller's current organization.
    pub fn issue_internal_token(&self, current: &AuthenticatedUser) -> Result<String, ConfigurationError> {
        let token = self.codec.issue_internal(current.subject())?;
        tracing::info!(
            user_id = current.profile().id,
            organization_id = current.organization().id,
            "internal token issued"
        );
        Ok(token)
    }
}
