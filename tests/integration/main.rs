// tests/integration/main.rs

mod auth;
mod common;
mod organization;
