use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use crate::auth::AuthError;
use crate::error::{ErrorResponse, ErrorType, RouteError, ServerFailure};
use crate::logging::{EventLog, TracingLog};
use crate::validation::ValidationErrors;

/// Status and JSON body produced by a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parse the body back into an error envelope (non-2xx replies only)
    pub fn error_body(&self) -> Option<ErrorResponse> {
        if self.is_success() {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Builds every response a pipeline writes.
///
/// Success bodies are written verbatim with 200; failures always use the
/// `ErrorResponse` shape and are logged before they are returned.
#[derive(Clone)]
pub struct ResponseEnvelope {
    log: Arc<dyn EventLog>,
}

impl fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseEnvelope").finish_non_exhaustive()
    }
}

impl Default for ResponseEnvelope {
    fn default() -> Self {
        Self::new(Arc::new(TracingLog))
    }
}

impl ResponseEnvelope {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn ok(&self, data: Value) -> Reply {
        Reply {
            status: StatusCode::OK,
            body: data,
        }
    }

    /// Serialize `data` and answer 200; a value that cannot be serialized is a server error
    pub fn ok_json<T: Serialize>(&self, data: &T) -> Reply {
        match serde_json::to_value(data) {
            Ok(value) => self.ok(value),
            Err(e) => self.server_error(ServerFailure::from_error(e)),
        }
    }

    pub fn error(&self, response: ErrorResponse) -> Reply {
        let mut response = response;
        response.error = true;
        self.log.log_error(&response);
        Reply {
            status: response.status(),
            body: response.to_json(),
        }
    }

    pub fn validation_error(&self, errors: &ValidationErrors) -> Reply {
        self.error(
            ErrorResponse::new(
                StatusCode::BAD_REQUEST.as_u16(),
                ErrorType::Validation,
                errors.message(),
            )
            .with_meta_data(errors.meta_data()),
        )
    }

    pub fn server_error(&self, failure: impl Into<ServerFailure>) -> Reply {
        let failure = failure.into();
        self.error(
            ErrorResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                ErrorType::Server,
                failure.message(),
            )
            .with_meta_data(failure.meta_data()),
        )
    }

    pub fn unauthorized(&self, err: &AuthError) -> Reply {
        let meta = json!({ "reason": err.reason() });
        self.error(
            ErrorResponse::new(
                StatusCode::UNAUTHORIZED.as_u16(),
                ErrorType::Authentication,
                err.to_string(),
            )
            .with_meta_data(meta.as_object().cloned().unwrap_or_default()),
        )
    }

    /// Render any stage or controller failure
    pub fn render(&self, err: RouteError) -> Reply {
        match err {
            RouteError::Validation(errors) => self.validation_error(&errors),
            RouteError::Unauthorized(e) => self.unauthorized(&e),
            RouteError::Server(failure) => self.server_error(failure),
            RouteError::Custom {
                code,
                error_type,
                message,
                meta_data,
            } => self.error(ErrorResponse::new(code, error_type, message).with_meta_data(meta_data)),
        }
    }
}
