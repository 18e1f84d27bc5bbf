// src/models/well_known.rs

//! Identifiers seeded at bootstrap that the rest of the system relies on.

/// The system organization. Seeded at bootstrap and can never be deactivated.
pub const SYSTEM_ORGANIZATION_ID: i64 = 1;

/// The bootstrap user created alongside the system organization.
pub const BOOTSTRAP_USER_ID: i64 = 1;

/// Alias of the system organization kind.
pub const SYSTEM_ALIAS: &str = "system";

/// Name of the super-role under the system alias.
pub const SUPER_ROLE_NAME: &str = "coder";

/// Display name given to the system organization at bootstrap.
pub const SYSTEM_ORGANIZATION_NAME: &str = "System";

/// Language assigned to users that did not choose one.
pub const DEFAULT_LANGUAGE: &str = "en";
