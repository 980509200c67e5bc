pub mod codec;

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{AuthConfig, ConfigError};
use crate::logging::EventLog;
use crate::middleware::auth::TokenLocation;
use crate::route::context::SessionData;

pub use codec::TokenCodec;
use codec::TokenLayer;

/// Why a token was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No auth token provided")]
    MissingToken,

    #[error("Auth token has expired")]
    Expired,

    #[error("Auth token signature is invalid")]
    InvalidSignature,

    #[error("Malformed auth token: {0}")]
    Malformed(String),

    #[error("Auth token could not be decrypted")]
    Decryption,

    #[error("Unable to sign auth token: {0}")]
    Signing(String),
}

impl AuthError {
    /// Short machine-readable reason, reported in `metaData`
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::Expired => "token_expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::Malformed(_) => "malformed_token",
            AuthError::Decryption => "decryption_failed",
            AuthError::Signing(_) => "signing_failed",
        }
    }
}

/// JWT claims: the session sits under `data`, next to the registered timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub data: SessionData,
    pub iat: i64,
    pub exp: i64,
}

/// Body returned to a client that just established a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub success: bool,
    pub token: String,
}

impl TokenGrant {
    pub fn new(token: String) -> Self {
        Self { success: true, token }
    }
}

/// Return the configured signing secret. There is no fallback: running
/// without a secret is a start-up error.
pub fn resolve_secret(configured: Option<&str>) -> Result<String, ConfigError> {
    match configured.map(str::trim) {
        Some(secret) if !secret.is_empty() => Ok(secret.to_string()),
        _ => Err(ConfigError::MissingSecret),
    }
}

/// Issues and verifies stateless session tokens
pub struct AuthTokenService {
    secret: String,
    default_max_age: u64,
    codec: TokenCodec,
    layer: TokenLayer,
    location: TokenLocation,
    log: Arc<dyn EventLog>,
}

impl fmt::Debug for AuthTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokenService")
            .field("secret", &"<redacted>")
            .field("default_max_age", &self.default_max_age)
            .field("codec", &self.codec)
            .field("location", &self.location)
            .finish()
    }
}

impl AuthTokenService {
    pub fn new(config: &AuthConfig, log: Arc<dyn EventLog>) -> Result<Self, ConfigError> {
        let secret = resolve_secret(Some(&config.secret))?;
        let layer = TokenLayer::new(config.codec, &secret)?;

        tracing::debug!(
            "Token service ready: codec={}, default max age={}s, location={:?}",
            config.codec,
            config.max_age_secs,
            config.token_location
        );

        Ok(Self {
            secret,
            default_max_age: config.max_age_secs,
            codec: config.codec,
            layer,
            location: config.token_location.clone(),
            log,
        })
    }

    pub fn codec(&self) -> TokenCodec {
        self.codec
    }

    pub fn default_max_age(&self) -> u64 {
        self.default_max_age
    }

    pub fn token_location(&self) -> &TokenLocation {
        &self.location
    }

    /// Sign `session_data` into a token valid for `max_age` seconds (the
    /// configured default when `None` or zero). A `password` entry is always
    /// dropped before signing.
    pub fn issue(&self, session_data: SessionData, max_age: Option<u64>) -> Result<String, AuthError> {
        let mut data = session_data;
        if data.remove("password").is_some() {
            self.log.warn("Dropped 'password' from session data before signing");
        }

        let max_age = max_age.filter(|age| *age > 0).unwrap_or(self.default_max_age);
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            data,
            iat: now,
            exp: now.saturating_add(i64::try_from(max_age).unwrap_or(i64::MAX)),
        };

        let signed = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(self.layer.seal(signed))
    }

    /// Undo the codec layer, check signature and expiry, return the session
    pub async fn verify(&self, token: &str) -> Result<SessionData, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let signed = self.layer.open(token)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = decode::<SessionClaims>(
            &signed,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Malformed(e.to_string()),
        })?;

        // jsonwebtoken only rejects once `exp < now`; a token is dead from its `exp` second on
        if token_data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(token_data.claims.data)
    }
}
