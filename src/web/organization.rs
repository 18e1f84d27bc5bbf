// src/web/organization.rs

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::bridge::SwitchFailed;
use crate::middleware::CurrentUser;
use crate::models::{MembershipStatus, Organization};
use crate::session::Session;
use crate::tenancy::SwitchError;
use crate::web::{ApiError, AppState};

#[derive(Deserialize)]
pub struct SwitchRequest {
    pub organization_id: i64,
}

#[derive(Serialize)]
pub struct OrganizationEntry {
    pub organization: Organization,
    pub status: MembershipStatus,
    pub current: bool,
}

impl From<SwitchFailed> for ApiError {
    fn from(e: SwitchFailed) -> Self {
        match e {
            SwitchFailed::Switch(SwitchError::SameOrganization) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "same_organization",
                "Already working in this organization",
            ),
            SwitchFailed::Switch(SwitchError::NotMember) => ApiError::new(
                StatusCode::NOT_ACCEPTABLE,
                "not_member",
                "Not a member of this organization",
            ),
            SwitchFailed::Switch(SwitchError::Store(e)) => {
                tracing::error!(error = %e, "organization switch failed");
                ApiError::internal()
            }
            SwitchFailed::Configuration(e) => {
                tracing::error!(error = %e, "organization switch could not issue a token");
                ApiError::internal()
            }
        }
    }
}

pub async fn switch_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    session: Session,
    Json(payload): Json<SwitchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization = state
        .bridge
        .switch_organization(&session, &user, payload.organization_id)?;
    Ok(Json(organization))
}

/// The caller's memberships in active organizations.
pub async fn list_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let memberships = state
        .bridge
        .memberships()
        .memberships(user.profile().id)
        .map_err(|e| {
            tracing::error!(error = %e, "failed to list memberships");
            ApiError::internal()
        })?;

    let current = user.organization().id;
    let entries: Vec<OrganizationEntry> = memberships
        .into_iter()
        .map(|m| OrganizationEntry {
            current: m.organization.id == current,
            status: m.membership.status,
            organization: m.organization,
        })
        .collect();
    Ok(Json(entries))
}
