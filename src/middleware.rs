// src/middleware.rs

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use cookie::{Cookie, SameSite};
use std::convert::Infallible;
use std::sync::Arc;

use crate::bridge::Rejected;
use crate::config::SessionConfig;
use crate::context::{AuthenticatedUser, RequestAuth};
use crate::session::{Session, SessionId};
use crate::web::{ApiError, AppState};

/// Liveness probe; bypasses sessions entirely.
pub const HEALTH_PATH: &str = "/health";

/// Opens the request's session, runs the auth bridge and attaches the
/// outcome. Rejected page loads (`GET`/`HEAD`) are redirected to the login
/// path unless they are already headed there; other rejected requests go on
/// anonymously and meet a 401 from [`CurrentUser`].
pub async fn session_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if request.uri().path() == HEALTH_PATH {
        return next.run(request).await;
    }

    let settings = state.session_config.clone();
    // Unknown ids are replaced rather than adopted.
    let known = session_id_from_headers(request.headers(), &settings.cookie_name)
        .filter(|id| state.sessions.exists(id));
    let session = Session::new(known.unwrap_or_else(SessionId::generate), state.sessions.clone());
    let redirect = request.uri().path() != settings.login_path
        && matches!(*request.method(), Method::GET | Method::HEAD);

    let auth = match state.bridge.authenticate(&session) {
        Ok(user) => RequestAuth::authenticated(user),
        Err(Rejected::Store(_)) => return ApiError::internal().into_response(),
        Err(_) if redirect => return Redirect::to(&settings.login_path).into_response(),
        Err(_) => RequestAuth::anonymous(),
    };

    request.extensions_mut().insert(auth);
    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    let cookie = match (known.is_some(), session.exists()) {
        (false, true) => Some(session_cookie(&settings, session.id().to_string())),
        (true, false) => {
            let mut removal = session_cookie(&settings, String::new());
            removal.make_removal();
            Some(removal)
        }
        _ => None,
    };
    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "session cookie is not a valid header value"),
        }
    }
    response
}

fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == cookie_name)
        .and_then(|cookie| SessionId::parse(cookie.value()))
}

fn session_cookie(settings: &SessionConfig, value: String) -> Cookie<'static> {
    Cookie::build((settings.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookie)
        .build()
}

// === Extractors ===

/// The authenticated caller; anonymous requests are refused with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Arc<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestAuth>()
            .and_then(|auth| auth.user().cloned())
            .map(CurrentUser)
            .ok_or_else(ApiError::unauthorized)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<RequestAuth>().cloned().unwrap_or_default())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("session layer is not installed");
            ApiError::internal()
        })
    }
}
