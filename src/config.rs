// src/config.rs

use jsonwebtoken::Algorithm;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::auth::{
    ConfigurationError, TokenSettings, DEFAULT_INTERNAL_TOKEN_LIFETIME_SECS,
    DEFAULT_TOKEN_LIFETIME_SECS,
};
use crate::raddb::MasterKey;
use crate::session::DEFAULT_MAX_SESSIONS;

/// Prefix of environment overrides, e.g. `DASHAUTH__SECURITY__JWT__SECRET_KEY`.
pub const ENV_PREFIX: &str = "DASHAUTH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("master_key_hex is required when db_path is set")]
    MissingMasterKey,
    #[error("master_key_hex must be 64 hex characters: {0}")]
    InvalidMasterKey(String),
    #[error(transparent)]
    Token(#[from] ConfigurationError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Encrypted store file. Without it the store lives in memory.
    pub db_path: Option<String>,
    pub master_key_hex: Option<String>,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub web_server: ServerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub jwt: JwtConfig,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    pub secret_key: Option<String>,
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_secs: i64,
    #[serde(default = "default_internal_token_lifetime")]
    pub internal_token_lifetime_secs: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithm: default_jwt_algorithm(),
            secret_key: None,
            token_lifetime_secs: default_token_lifetime(),
            internal_token_lifetime_secs: default_internal_token_lifetime(),
        }
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("algorithm", &self.algorithm)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .field("internal_token_lifetime_secs", &self.internal_token_lifetime_secs)
            .finish()
    }
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_token_lifetime() -> i64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_internal_token_lifetime() -> i64 {
    DEFAULT_INTERNAL_TOKEN_LIFETIME_SECS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Requests to this path are never redirected.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default)]
    pub secure_cookie: bool,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    /// Idle sessions expire after this long; defaults to the token lifetime.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            login_path: default_login_path(),
            secure_cookie: false,
            max_sessions: default_max_sessions(),
            idle_timeout_secs: None,
        }
    }
}

fn default_max_sessions() -> u64 {
    DEFAULT_MAX_SESSIONS
}

fn default_cookie_name() -> String {
    "dashauth_session".to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub enable_json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            enable_json_output: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Reads `.env`, then the optional YAML file, then `DASHAUTH__*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// `None` when the store is in memory.
    pub fn master_key(&self) -> Result<Option<MasterKey>, ConfigError> {
        if self.db_path.is_none() {
            return Ok(None);
        }
        let hex_key = self
            .master_key_hex
            .as_deref()
            .ok_or(ConfigError::MissingMasterKey)?;
        let bytes = hex::decode(hex_key.trim()).map_err(|e| ConfigError::InvalidMasterKey(e.to_string()))?;
        let key: MasterKey = bytes
            .try_into()
            .map_err(|b: Vec<u8>| ConfigError::InvalidMasterKey(format!("got {} bytes", b.len())))?;
        Ok(Some(key))
    }

    /// Token codec inputs. A missing secret is fatal outside development.
    pub fn token_settings(&self) -> Result<TokenSettings, ConfigurationError> {
        let jwt = &self.security.jwt;
        let algorithm = Algorithm::from_str(jwt.algorithm.trim())
            .map_err(|_| ConfigurationError::UnsupportedAlgorithm(jwt.algorithm.clone()))?;

        let secret = match jwt.secret_key.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => secret.to_string(),
            None if self.environment == Environment::Development => {
                tracing::warn!("no token secret configured; using an ephemeral one, sessions end on restart");
                ephemeral_secret()
            }
            None => return Err(ConfigurationError::MissingSecret),
        };

        Ok(TokenSettings {
            secret: Some(secret),
            algorithm,
            lifetime_secs: jwt.token_lifetime_secs,
            internal_lifetime_secs: jwt.internal_token_lifetime_secs,
        })
    }

    pub fn session_idle_timeout(&self) -> Duration {
        let secs = self
            .session
            .idle_timeout_secs
            .unwrap_or_else(|| self.security.jwt.token_lifetime_secs.max(1).unsigned_abs());
        Duration::from_secs(secs)
    }
}

fn ephemeral_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
