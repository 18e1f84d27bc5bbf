// tests/integration/auth.rs

use axum::http::{header, StatusCode};
use serde_json::{json, Value};

use dashauth::repository::UserRepository;

use crate::common::{session_cookie, spawn_app, PASSWORD};

#[tokio::test]
async fn health_needs_no_session() {
    let app = spawn_app();
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "status": "ok" }));
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn anonymous_page_load_redirects_to_login() {
    let app = spawn_app();
    let response = app.server.get("/api/me").await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn login_page_never_redirects() {
    let app = spawn_app();
    let response = app.server.get("/login").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "authenticated": false }));
}

#[tokio::test]
async fn login_success_scopes_session_to_selected_organization() {
    let app = spawn_app();
    let response = app.login("alice@example.com", PASSWORD).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["organization"]["id"], app.clinic_a);
    assert!(body["user"].get("password_hash").is_none());

    let cookie = session_cookie(&response);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));

    let me = app.get("/api/me", &cookie).await;
    me.assert_status_ok();
    let me: Value = me.json();
    assert_eq!(me["profile"]["id"], app.alice);
    assert_eq!(me["organization"]["id"], app.clinic_a);
    assert_eq!(me["permissions"], json!({}));

    let page: Value = app.get("/login", &cookie).await.json();
    assert_eq!(page["authenticated"], true);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_are_indistinguishable() {
    let app = spawn_app();
    let unknown = app.login("mallory", PASSWORD).await;
    let wrong = app.login("alice", "not the password").await;

    unknown.assert_status_unauthorized();
    wrong.assert_status_unauthorized();
    assert_eq!(unknown.json::<Value>(), wrong.json::<Value>());
    assert_eq!(wrong.json::<Value>()["code"], "invalid_credentials");
}

#[tokio::test]
async fn inactive_user_gets_distinct_code() {
    let app = spawn_app();
    app.store.set_user_active(app.alice, false).unwrap();
    let response = app.login("alice", PASSWORD).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "inactive_user");
}

#[tokio::test]
async fn deactivated_user_loses_session() {
    let app = spawn_app();
    let cookie = app.login_alice().await;
    app.store.set_user_active(app.alice, false).unwrap();

    let response = app.get("/api/me", &cookie).await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn stale_token_on_login_page_is_dropped_without_redirect() {
    let app = spawn_app();
    let cookie = app.login_alice().await;
    assert!(app.stored_token(&cookie).is_some());
    app.store.set_user_active(app.alice, false).unwrap();

    let response = app.get("/login", &cookie).await;
    response.assert_status_ok();
    assert!(response.headers().get(header::LOCATION).is_none());
    response.assert_json(&json!({ "authenticated": false }));
    assert!(app.stored_token(&cookie).is_none());
}

#[tokio::test]
async fn logout_ends_session() {
    let app = spawn_app();
    let cookie = app.login_alice().await;

    let response = app
        .server
        .post("/logout")
        .add_header(header::COOKIE, cookie.clone())
        .await;
    assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    let removal = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(removal.starts_with("dashauth_session=;"));

    let me = app.get("/api/me", &cookie).await;
    assert_eq!(me.status_code(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn forged_session_cookie_is_not_adopted() {
    let app = spawn_app();
    let forged = axum::http::HeaderValue::from_static(
        "dashauth_session=7f1f5b0e-8a53-4c39-9a55-2f7e7b8f2b11",
    );
    let response = app.get("/login", &forged).await;
    response.assert_status_ok();
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn internal_token_is_long_lived() {
    let app = spawn_app();
    let cookie = app.login_alice().await;

    let response = app.get("/api/token/internal", &cookie).await;
    response.assert_status_ok();
    let body: Value = response.json();
    let token = body["token"].as_str().unwrap();

    let claims = app.bridge.codec().validate(token).unwrap();
    assert_eq!(claims.user_id, app.alice);
    assert_eq!(claims.organization_id, app.clinic_a);
    assert_eq!(claims.seconds, 30 * 24 * 3600);
    assert_eq!(body["expires_in"], claims.seconds);
}
