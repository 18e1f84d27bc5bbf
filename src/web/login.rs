// src/web/login.rs

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::bridge::LoginError;
use crate::context::RequestAuth;
use crate::middleware::CurrentUser;
use crate::models::{Organization, UserProfile};
use crate::session::Session;
use crate::web::{ApiError, AppState};

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub organization: Organization,
}

impl From<LoginError> for ApiError {
    fn from(e: LoginError) -> Self {
        match e {
            LoginError::InvalidCredentials => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid username or password",
            ),
            LoginError::InactiveUser => {
                ApiError::new(StatusCode::FORBIDDEN, "inactive_user", "User is inactive")
            }
            LoginError::NoOrganization => ApiError::new(
                StatusCode::FORBIDDEN,
                "no_organization",
                "User does not belong to any organization",
            ),
            LoginError::Internal(_) => ApiError::internal(),
        }
    }
}

/// Whether the caller is logged in. Never redirects.
pub async fn login_page(auth: RequestAuth) -> impl IntoResponse {
    match auth.user() {
        Some(user) => Json(json!({ "authenticated": true, "user": user.profile() })),
        None => Json(json!({ "authenticated": false })),
    }
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let bridge = state.bridge.clone();
    // bcrypt verification is CPU-bound.
    let user = tokio::task::spawn_blocking(move || {
        bridge.login(&session, &payload.login, &payload.password)
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "login task failed");
        ApiError::internal()
    })??;

    Ok(Json(LoginResponse {
        user: user.profile().clone(),
        organization: user.organization().clone(),
    }))
}

pub async fn logout_handler(State(state): State<AppState>, session: Session) -> impl IntoResponse {
    state.bridge.logout(&session);
    StatusCode::NO_CONTENT
}

pub async fn internal_token_handler(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let token = state.bridge.issue_internal_token(&user).map_err(|e| {
        tracing::error!(error = %e, "failed to issue internal token");
        ApiError::internal()
    })?;
    Ok(Json(json!({
        "token": token,
        "expires_in": state.bridge.codec().internal_lifetime_secs(),
    })))
}
