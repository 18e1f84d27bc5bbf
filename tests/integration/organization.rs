// tests/integration/organization.rs

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestResponse;
use serde_json::{json, Value};

use dashauth::models::RoleKey;
use dashauth::repository::{MembershipRepository, OrganizationRepository, RbacRepository};

use crate::common::{spawn_app, TestApp};

async fn switch(app: &TestApp, cookie: &HeaderValue, organization_id: i64) -> TestResponse {
    app.server
        .post("/organization/switch")
        .add_header(header::COOKIE, cookie.clone())
        .json(&json!({ "organization_id": organization_id }))
        .await
}

fn selected(app: &TestApp) -> Vec<i64> {
    app.store
        .memberships_of(app.alice)
        .unwrap()
        .into_iter()
        .filter(|m| m.is_selected())
        .map(|m| m.organization_id)
        .collect()
}

#[tokio::test]
async fn switch_moves_session_to_target() {
    let app = spawn_app();
    let cookie = app.login_alice().await;

    let response = switch(&app, &cookie, app.clinic_b).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["id"], app.clinic_b);
    assert_eq!(selected(&app), vec![app.clinic_b]);

    let me: Value = app.get("/api/me", &cookie).await.json();
    assert_eq!(me["organization"]["id"], app.clinic_b);

    switch(&app, &cookie, app.clinic_a).await.assert_status_ok();
    assert_eq!(selected(&app), vec![app.clinic_a]);
}

#[tokio::test]
async fn switch_to_current_organization_is_bad_request() {
    let app = spawn_app();
    let cookie = app.login_alice().await;

    let response = switch(&app, &cookie, app.clinic_a).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], "same_organization");
}

#[tokio::test]
async fn switch_to_foreign_organization_is_not_acceptable() {
    let app = spawn_app();
    let cookie = app.login_alice().await;

    let response = switch(&app, &cookie, app.clinic_c).await;
    assert_eq!(response.status_code(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(response.json::<Value>()["code"], "not_member");
    assert_eq!(selected(&app), vec![app.clinic_a]);
    assert!(app.store.find_membership(app.alice, app.clinic_c).unwrap().is_none());

    let me: Value = app.get("/api/me", &cookie).await.json();
    assert_eq!(me["organization"]["id"], app.clinic_a);
}

#[tokio::test]
async fn anonymous_switch_is_unauthorized() {
    let app = spawn_app();
    let response = app
        .server
        .post("/organization/switch")
        .json(&json!({ "organization_id": app.clinic_b }))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn super_role_can_enter_any_organization() {
    let app = spawn_app();
    app.store
        .set_user_role(app.alice, &RoleKey::super_role(), true)
        .unwrap();
    let cookie = app.login_alice().await;

    switch(&app, &cookie, app.clinic_c).await.assert_status_ok();
    assert_eq!(selected(&app), vec![app.clinic_c]);

    let me: Value = app.get("/api/me", &cookie).await.json();
    assert_eq!(me["permissions"], json!({ "system_coder": {} }));
}

#[tokio::test]
async fn deactivating_organization_ends_its_sessions() {
    let app = spawn_app();
    let cookie = app.login_alice().await;
    app.store.set_organization_active(app.clinic_a, false).unwrap();

    let response = app.get("/api/me", &cookie).await;
    assert_eq!(response.status_code(), StatusCode::SEE_OTHER);

    // The rejected token was discarded; logging in again picks the next membership.
    let page: Value = app.get("/login", &cookie).await.json();
    assert_eq!(page["authenticated"], false);
    let response = app.login("alice", crate::common::PASSWORD).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["organization"]["id"], app.clinic_b);
}

#[tokio::test]
async fn lists_memberships_with_current_marker() {
    let app = spawn_app();
    let cookie = app.login_alice().await;

    let response = app.get("/api/organizations", &cookie).await;
    response.assert_status_ok();
    let entries: Vec<Value> = response.json();
    let summary: Vec<(i64, bool, String)> = entries
        .iter()
        .map(|e| {
            (
                e["organization"]["id"].as_i64().unwrap(),
                e["current"].as_bool().unwrap(),
                e["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (app.clinic_a, true, "active".to_string()),
            (app.clinic_b, false, "pending".to_string()),
        ]
    );
}
