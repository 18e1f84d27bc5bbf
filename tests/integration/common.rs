// tests/integration/common.rs

use axum::http::{header, HeaderValue};
use axum_test::{TestResponse, TestServer};
use serde_json::json;
use std::sync::Arc;

use dashauth::auth::{TokenCodec, TokenSettings};
use dashauth::bridge::AuthSessionBridge;
use dashauth::config::SessionConfig;
use dashauth::models::{Alias, NewOrganization, NewUser, PasswordHash};
use dashauth::repository::{MembershipRepository, OrganizationRepository, UserRepository};
use dashauth::session::{MemorySessionStore, SessionId, SessionStore, TOKEN_SLOT};
use dashauth::store::AuthStore;
use dashauth::web::{create_router, AppState};

pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<AuthStore>,
    pub bridge: AuthSessionBridge<AuthStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub alice: i64,
    /// Alice's selected organization.
    pub clinic_a: i64,
    /// Alice is a pending member here.
    pub clinic_b: i64,
    /// Alice was never added here.
    pub clinic_c: i64,
}

fn hash(password: &str) -> PasswordHash {
    PasswordHash::new_bcrypt_with_cost(password, 4).unwrap()
}

pub fn spawn_app() -> TestApp {
    let store = Arc::new(AuthStore::in_memory());
    store.bootstrap("root", "root@example.com", hash("root-password")).unwrap();

    let alice = store
        .create_user(NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: hash(PASSWORD),
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
    let (clinic_a, clinic_b, clinic_c) = (org("Clinic A"), org("Clinic B"), org("Clinic C"));
    store.add_membership(alice, clinic_a).unwrap();
    store.activate_membership(alice, clinic_a, false).unwrap();
    store.add_membership(alice, clinic_b).unwrap();

    let codec = Arc::new(TokenCodec::new(&TokenSettings::new("integration-secret-0123456789abcdef")).unwrap());
    let bridge = AuthSessionBridge::new(codec, store.clone());
    let sessions = Arc::new(MemorySessionStore::default());
    let state = AppState::new(bridge.clone(), sessions.clone(), SessionConfig::default());
    let server = TestServer::new(create_router(state)).unwrap();

    TestApp {
        server,
        store,
        bridge,
        sessions,
        alice,
        clinic_a,
        clinic_b,
        clinic_c,
    }
}

/// `name=value` part of the response's Set-Cookie header.
pub fn session_cookie(response: &TestResponse) -> HeaderValue {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response sets a cookie")
        .to_str()
        .unwrap();
    HeaderValue::from_str(set_cookie.split(';').next().unwrap()).unwrap()
}

/// Session id carried by a `name=value` cookie.
pub fn session_id(cookie: &HeaderValue) -> SessionId {
    let value = cookie.to_str().unwrap().split_once('=').unwrap().1;
    SessionId::parse(value).unwrap()
}

impl TestApp {
    pub async fn login(&self, login: &str, password: &str) -> TestResponse {
        self.server
            .post("/login")
            .json(&json!({ "login": login, "password": password }))
            .await
    }

    /// Logs alice in and returns her session cookie.
    pub async fn login_alice(&self) -> HeaderValue {
        let response = self.login("alice", PASSWORD).await;
        response.assert_status_ok();
        session_cookie(&response)
    }

    pub fn stored_token(&self, cookie: &HeaderValue) -> Option<String> {
        self.sessions.get(&session_id(cookie), TOKEN_SLOT)
    }

    pub async fn get(&self, path: &str, cookie: &HeaderValue) -> TestResponse {
        self.server
            .get(path)
            .add_header(header::COOKIE, cookie.clone())
            .await
    }
}
