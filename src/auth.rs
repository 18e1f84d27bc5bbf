// src/auth.rs

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default lifetime of a dashboard token: 7 days.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 3600;

/// Default lifetime of the internal token variant: 30 days.
pub const DEFAULT_INTERNAL_TOKEN_LIFETIME_SECS: i64 = 30 * 24 * 3600;

/// Fatal misconfiguration of the token codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no token signing secret is configured")]
    MissingSecret,
    #[error("algorithm {0} cannot sign with a symmetric secret")]
    UnsupportedAlgorithm(String),
    #[error("token lifetime must be positive, got {0}s")]
    InvalidLifetime(i64),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Token-level validation failure. Always recoverable by logging in again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token has expired")]
    Expired,
    #[error("token is missing the {0} claim")]
    Malformed(&'static str),
    #[error("invalid token: {0}")]
    Invalid(String),
}

// === Claims ===

/// Who a token is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub user_id: i64,
    pub organization_id: i64,
}

/// Signed claims, as they appear on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iat: i64,
    pub exp: i64,
    /// Lifetime the token was issued with.
    pub seconds: i64,
    pub user_id: i64,
    pub organization_id: i64,
}

impl TokenClaims {
    pub fn subject(&self) -> Subject {
        Subject {
            user_id: self.user_id,
            organization_id: self.organization_id,
        }
    }
}

// Decoded leniently so that missing fields surface as `Malformed`.
#[derive(Debug, Deserialize)]
struct RawClaims {
    iat: Option<i64>,
    exp: Option<i64>,
    seconds: Option<i64>,
    user_id: Option<i64>,
    organization_id: Option<i64>,
}

impl RawClaims {
    fn into_claims(self) -> Result<TokenClaims, AuthError> {
        let user_id = self.user_id.ok_or(AuthError::Malformed("user_id"))?;
        let organization_id = self.organization_id.ok_or(AuthError::Malformed("organization_id"))?;
        let exp = self.exp.ok_or(AuthError::Malformed("exp"))?;
        let (iat, seconds) = match (self.iat, self.seconds) {
            (Some(iat), Some(seconds)) => (iat, seconds),
            (Some(iat), None) => (iat, exp - iat),
            (None, Some(seconds)) => (exp - seconds, seconds),
            (None, None) => (exp, 0),
        };
        Ok(TokenClaims {
            iat,
            exp,
            seconds,
            user_id,
            organization_id,
        })
    }
}

// === Codec ===

/// Inputs of [`TokenCodec::new`], resolved from configuration.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: Option<String>,
    pub algorithm: Algorithm,
    pub lifetime_secs: i64,
    pub internal_lifetime_secs: i64,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("algorithm", &self.algorithm)
            .field("lifetime_secs", &self.lifetime_secs)
            .field("internal_lifetime_secs", &self.internal_lifetime_secs)
            .finish()
    }
}

impl TokenSettings {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            algorithm: Algorithm::HS256,
            lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            internal_lifetime_secs: DEFAULT_INTERNAL_TOKEN_LIFETIME_SECS,
        }
    }
}

/// Issues and validates signed, expiring tokens. Stateless; share it freely.
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime_secs: i64,
    internal_lifetime_secs: i64,
}

impl TokenCodec {
    pub fn new(settings: &TokenSettings) -> Result<Self, ConfigurationError> {
        let secret = settings
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigurationError::MissingSecret)?;

        if !matches!(settings.algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigurationError::UnsupportedAlgorithm(format!("{:?}", settings.algorithm)));
        }
        for lifetime in [settings.lifetime_secs, settings.internal_lifetime_secs] {
            if lifetime <= 0 {
                return Err(ConfigurationError::InvalidLifetime(lifetime));
            }
        }
        if secret.len() < 32 {
            tracing::warn!("token secret is shorter than recommended (32 bytes)");
        }

        // Expiry is checked by hand: a token is expired from the second `exp` is reached.
        let mut validation = Validation::new(settings.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            algorithm: settings.algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime_secs: settings.lifetime_secs,
            internal_lifetime_secs: settings.internal_lifetime_secs,
        })
    }

    /// Dashboard token with the configured lifetime.
    pub fn issue(&self, subject: Subject) -> Result<String, ConfigurationError> {
        self.issue_with_lifetime(subject, self.lifetime_secs)
    }

    /// Internal token variant with the longer configured lifetime.
    pub fn issue_internal(&self, subject: Subject) -> Result<String, ConfigurationError> {
        self.issue_with_lifetime(subject, self.internal_lifetime_secs)
    }

    pub fn issue_with_lifetime(
        &self,
        subject: Subject,
        lifetime_secs: i64,
    ) -> Result<String, ConfigurationError> {
        self.issue_at(subject, lifetime_secs, now())
    }

    pub fn issue_at(
        &self,
        subject: Subject,
        lifetime_secs: i64,
        issued_at: i64,
    ) -> Result<String, ConfigurationError> {
        if lifetime_secs <= 0 {
            return Err(ConfigurationError::InvalidLifetime(lifetime_secs));
        }
        let exp = issued_at
            .checked_add(lifetime_secs)
            .ok_or(ConfigurationError::InvalidLifetime(lifetime_secs))?;
        let claims = TokenClaims {
            iat: issued_at,
            exp,
            seconds: lifetime_secs,
            user_id: subject.user_id,
            organization_id: subject.organization_id,
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| ConfigurationError::Signing(e.to_string()))
    }

    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.validate_at(token, now())
    }

    pub fn validate_at(&self, token: &str, now: i64) -> Result<TokenClaims, AuthError> {
        decode_header(token).map_err(|e| AuthError::Invalid(e.to_string()))?;
        // With the header parsed, a JSON error can only come from the signed payload.
        let data = decode::<RawClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::Json(_) => AuthError::Malformed("payload"),
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;

        let claims = data.claims.into_claims()?;
        if now >= claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    pub fn internal_lifetime_secs(&self) -> i64 {
        self.internal_lifetime_secs
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("lifetime_secs", &self.lifetime_secs)
            .field("internal_lifetime_secs", &self.internal_lifetime_secs)
            .finish()
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
