use async_trait::async_trait;
use axum::http::header;
use std::sync::Arc;

use crate::auth::{AuthError, AuthTokenService};
use crate::error::RouteError;
use crate::route::context::RequestContext;
use crate::route::Middleware;

/// Where the authentication gate looks for the session token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenLocation {
    /// `Authorization: Bearer <token>`
    #[default]
    BearerHeader,
    /// Raw token in a named header
    Header(String),
    /// Raw token in a named cookie
    Cookie(String),
}

impl TokenLocation {
    pub fn extract(&self, ctx: &RequestContext) -> Result<String, AuthError> {
        match self {
            TokenLocation::BearerHeader => extract_bearer_token(ctx),
            TokenLocation::Header(name) => ctx
                .header(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::MissingToken),
            TokenLocation::Cookie(name) => ctx
                .cookie(name)
                .filter(|v| !v.is_empty())
                .ok_or(AuthError::MissingToken),
        }
    }
}

/// Extract token from Authorization header
fn extract_bearer_token(ctx: &RequestContext) -> Result<String, AuthError> {
    let auth_str = ctx
        .header(header::AUTHORIZATION.as_str())
        .ok_or(AuthError::MissingToken)?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }
        Ok(token.trim().to_string())
    } else {
        Err(AuthError::Malformed(
            "Authorization header must use Bearer token format".to_string(),
        ))
    }
}

/// Pipeline stage that admits only requests carrying a valid session token.
/// On success the decoded session is stored on the request context.
#[derive(Debug, Clone)]
pub struct AuthenticationGate {
    service: Arc<AuthTokenService>,
}

impl AuthenticationGate {
    pub fn new(service: Arc<AuthTokenService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<AuthTokenService> {
        &self.service
    }
}

#[async_trait]
impl Middleware for AuthenticationGate {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), RouteError> {
        let token = self.service.token_location().extract(ctx)?;

        let session = self.service.verify(&token).await.map_err(|e| {
            match &e {
                AuthError::InvalidSignature | AuthError::Decryption => {
                    tracing::warn!(request_id = %ctx.request_id, "Authentication failed: {}", e)
                }
                _ => tracing::debug!(request_id = %ctx.request_id, "Authentication failed: {}", e),
            }
            e
        })?;

        ctx.set_session(session);
        Ok(())
    }
}
