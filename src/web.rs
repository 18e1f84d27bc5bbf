// src/web.rs

pub mod login;
pub mod organization;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::bridge::AuthSessionBridge;
use crate::config::SessionConfig;
use crate::middleware::{session_auth, CurrentUser, HEALTH_PATH};
use crate::session::SessionStore;
use crate::store::AuthStore;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub bridge: AuthSessionBridge<AuthStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub session_config: Arc<SessionConfig>,
}

impl AppState {
    pub fn new(
        bridge: AuthSessionBridge<AuthStore>,
        sessions: Arc<dyn SessionStore>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            bridge,
            sessions,
            session_config: Arc::new(session_config),
        }
    }
}

/// JSON error body `{"code": ..., "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "Not logged in")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "Internal error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "code": self.code, "error": self.message })),
        )
            .into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    let login_path = state.session_config.login_path.clone();

    Router::new()
        .route(&login_path, get(login::login_page).post(login::login_handler))
        .route("/logout", post(login::logout_handler))
        .route("/organization/switch", post(organization::switch_handler))
        .route("/api/me", get(me_handler))
        .route("/api/organizations", get(organization::list_handler))
        .route("/api/token/internal", get(login::internal_token_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(from_fn_with_state(state.clone(), session_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn me_handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(user.as_ref().clone())
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn run_web_server(state: AppState, addr: &str) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "web server listening");
    axum::serve(listener, app).await
}
