use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use thiserror::Error;

use crate::auth::{resolve_secret, TokenCodec};
use crate::middleware::auth::TokenLocation;

pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024; // 2MB

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JWT_SECRET is not set; refusing to start without a signing secret")]
    MissingSecret,

    #[error("Unknown JWT_CODEC value '{0}' (expected 'signed' or 'encrypted')")]
    InvalidCodec(String),

    #[error("JWT_SECRET cannot be turned into an encryption key")]
    InvalidSecret,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub server: ServerConfig,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub max_age_secs: u64,
    pub codec: TokenCodec,
    pub token_location: TokenLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub max_body_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key/value source; tests pass a closure over a map
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            auth: AuthConfig::from_lookup(&lookup)?,
            server: ServerConfig::from_lookup(&lookup),
        })
    }
}

impl AuthConfig {
    /// Defaults around an explicit secret
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            codec: TokenCodec::default(),
            token_location: TokenLocation::default(),
        }
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = resolve_secret(lookup("JWT_SECRET").as_deref())?;
        let mut config = Self::with_secret(secret);

        if let Some(v) = lookup("JWT_MAX_AGE") {
            match v.trim().parse::<u64>() {
                Ok(age) if age > 0 => config.max_age_secs = age,
                _ => tracing::warn!(
                    "Ignoring JWT_MAX_AGE={:?}; using {} seconds",
                    v,
                    config.max_age_secs
                ),
            }
        }
        if let Some(v) = lookup("JWT_CODEC") {
            config.codec = v.parse()?;
        }
        if let Some(v) = lookup("JWT_COOKIE") {
            if !v.trim().is_empty() {
                config.token_location = TokenLocation::Cookie(v.trim().to_string());
            }
        }

        Ok(config)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("max_age_secs", &self.max_age_secs)
            .field("codec", &self.codec)
            .field("token_location", &self.token_location)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Allow tests or deployments to override port via env
        if let Some(port) = lookup("ROUTE_PIPELINE_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|s| s.parse::<u16>().ok())
        {
            config.port = port;
        }
        if let Some(v) = lookup("ROUTE_PIPELINE_MAX_BODY_BYTES") {
            config.max_body_bytes = v.parse().unwrap_or(config.max_body_bytes);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_secret_is_fatal() {
        let result = AppConfig::from_lookup(lookup(&[("JWT_MAX_AGE", "60")]));
        assert_eq!(result.unwrap_err(), ConfigError::MissingSecret);
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "test1")])).unwrap();
        assert_eq!(config.auth.max_age_secs, DEFAULT_MAX_AGE_SECS);
        assert_eq!(config.auth.codec, TokenCodec::Encrypted);
        assert_eq!(config.auth.token_location, TokenLocation::BearerHeader);
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn overrides_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "test1"),
            ("JWT_MAX_AGE", "120"),
            ("JWT_CODEC", "signed"),
            ("JWT_COOKIE", "sid"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.auth.max_age_secs, 120);
        assert_eq!(config.auth.codec, TokenCodec::Signed);
        assert_eq!(config.auth.token_location, TokenLocation::Cookie("sid".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn unparsable_max_age_keeps_default() {
        let config = AuthConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("JWT_MAX_AGE", "soon")])).unwrap();
        assert_eq!(config.max_age_secs, DEFAULT_MAX_AGE_SECS);
    }

    #[test]
    fn unknown_codec_is_an_error() {
        let result = AuthConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), ("JWT_CODEC", "xor")]));
        assert_eq!(result.unwrap_err(), ConfigError::InvalidCodec("xor".to_string()));
    }
}
