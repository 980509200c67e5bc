// handlers/session.rs - POST /session and GET /session

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::auth::{AuthTokenService, TokenGrant};
use crate::error::RouteError;
use crate::route::{Controller, HandlerResult, RequestContext};

/// POST /session - exchange a username for a session token
///
/// Input: `{"username": "ada", "password": "..."}` (password is accepted and
/// dropped before signing). Output: `{"success": true, "token": "..."}`.
pub struct IssueSession {
    service: Arc<AuthTokenService>,
}

impl IssueSession {
    pub fn new(service: Arc<AuthTokenService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Controller for IssueSession {
    async fn call(&self, ctx: RequestContext) -> HandlerResult {
        let token = self
            .service
            .issue(ctx.input(), None)
            .map_err(RouteError::server)?;

        tracing::info!(request_id = %ctx.request_id, "Issued session token");
        serde_json::to_value(TokenGrant::new(token)).map_err(RouteError::server)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub username: String,
}

/// GET /session - the decoded session of the caller
pub async fn current_session(ctx: RequestContext) -> HandlerResult {
    let user: SessionUser = ctx
        .authenticated_user()
        .ok_or_else(|| RouteError::custom(422, "SESSION_ERROR", "Session carries no username"))?;

    let session = ctx.session().cloned().unwrap_or_default();
    Ok(serde_json::json!({
        "username": user.username,
        "session": Value::Object(session),
    }))
}
