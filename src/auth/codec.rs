// Outer layer applied to signed session tokens
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use fernet::Fernet;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::AuthError;
use crate::config::ConfigError;

/// Token layout produced by `AuthTokenService::issue`.
///
/// A service accepts exactly the layout it issues; tokens minted under the
/// other codec fail verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCodec {
    /// Plain HS256 JWT
    Signed,
    /// HS256 JWT wrapped in Fernet (AES-128-CBC + HMAC-SHA256)
    #[default]
    Encrypted,
}

impl fmt::Display for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenCodec::Signed => f.write_str("signed"),
            TokenCodec::Encrypted => f.write_str("encrypted"),
        }
    }
}

impl FromStr for TokenCodec {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "signed" | "jwt" => Ok(TokenCodec::Signed),
            "encrypted" | "signed+encrypted" => Ok(TokenCodec::Encrypted),
            other => Err(ConfigError::InvalidCodec(other.to_string())),
        }
    }
}

pub(crate) enum TokenLayer {
    Plain,
    Encrypted(Fernet),
}

impl TokenLayer {
    pub(crate) fn new(codec: TokenCodec, secret: &str) -> Result<Self, ConfigError> {
        match codec {
            TokenCodec::Signed => Ok(TokenLayer::Plain),
            TokenCodec::Encrypted => Fernet::new(&derive_key(secret))
                .map(TokenLayer::Encrypted)
                .ok_or(ConfigError::InvalidSecret),
        }
    }

    pub(crate) fn seal(&self, signed: String) -> String {
        match self {
            TokenLayer::Plain => signed,
            TokenLayer::Encrypted(fernet) => fernet.encrypt(signed.as_bytes()),
        }
    }

    pub(crate) fn open(&self, token: &str) -> Result<String, AuthError> {
        match self {
            TokenLayer::Plain => Ok(token.to_string()),
            TokenLayer::Encrypted(fernet) => {
                let plain = fernet.decrypt(token).map_err(|_| AuthError::Decryption)?;
                String::from_utf8(plain).map_err(|_| AuthError::Decryption)
            }
        }
    }
}

/// Fernet wants 32 url-safe base64 bytes; stretch the secret with SHA-256
fn derive_key(secret: &str) -> String {
    URL_SAFE.encode(Sha256::digest(secret.as_bytes()))
}
