// src/lib.rs

pub mod auth;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod raddb;
pub mod rbac;
pub mod repository;
pub mod session;
pub mod store;
pub mod tenancy;
pub mod web;
