// Pipeline failure types and the wire-level error envelope
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::any::Any;
use std::fmt;

use crate::auth::AuthError;
use crate::validation::ValidationErrors;

/// Error category carried in the `type` field of every error body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorType {
    Validation,
    Authentication,
    Server,
    Custom(String),
}

impl ErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::Validation => "VALIDATION_ERROR",
            ErrorType::Authentication => "AUTHENTICATION_ERROR",
            ErrorType::Server => "SERVER_ERROR",
            ErrorType::Custom(name) => name,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(match name.as_str() {
            "VALIDATION_ERROR" => ErrorType::Validation,
            // AUTH_ERROR is the older spelling still found in clients
            "AUTHENTICATION_ERROR" | "AUTH_ERROR" => ErrorType::Authentication,
            "SERVER_ERROR" => ErrorType::Server,
            _ => ErrorType::Custom(name),
        })
    }
}

/// The error body written for every failed request:
/// `{"error": true, "code": 400, "type": "...", "message": "...", "metaData": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub code: u16,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub message: String,
    #[serde(rename = "metaData", default)]
    pub meta_data: Map<String, Value>,
}

impl ErrorResponse {
    pub fn new(code: u16, error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            error: true,
            code,
            error_type,
            message: message.into(),
            meta_data: Map::new(),
        }
    }

    pub fn with_meta_data(mut self, meta_data: Map<String, Value>) -> Self {
        self.meta_data = meta_data;
        self
    }

    /// HTTP status for this body; codes outside the valid range become 500
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "code": self.code,
            "type": self.error_type.as_str(),
            "message": self.message,
            "metaData": self.meta_data,
        })
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}

/// A failure that ends up as a 500 response.
///
/// Structured failures keep the original error so the envelope can report its
/// type name and cause chain in `metaData`; plain messages carry no metadata.
#[derive(Debug)]
pub enum ServerFailure {
    Structured { name: String, error: anyhow::Error },
    Message(String),
}

impl ServerFailure {
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ServerFailure::Structured {
            name: short_type_name::<E>().to_string(),
            error: anyhow::Error::new(error),
        }
    }

    /// Build a failure from a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "controller panicked".to_string()
        };
        ServerFailure::Structured {
            name: "panic".to_string(),
            error: anyhow::anyhow!(message),
        }
    }

    pub fn message(&self) -> String {
        match self {
            ServerFailure::Structured { error, .. } => error.to_string(),
            ServerFailure::Message(message) => message.clone(),
        }
    }

    /// `{name, stack}` for structured failures, empty otherwise
    pub fn meta_data(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        if let ServerFailure::Structured { name, error } = self {
            meta.insert("name".to_string(), Value::String(name.clone()));
            // anyhow's debug form lists the cause chain and any captured backtrace
            meta.insert("stack".to_string(), Value::String(format!("{:?}", error)));
        }
        meta
    }
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl From<anyhow::Error> for ServerFailure {
    fn from(error: anyhow::Error) -> Self {
        ServerFailure::Structured {
            name: "Error".to_string(),
            error,
        }
    }
}

impl From<String> for ServerFailure {
    fn from(message: String) -> Self {
        ServerFailure::Message(message)
    }
}

impl From<&str> for ServerFailure {
    fn from(message: &str) -> Self {
        ServerFailure::Message(message.to_string())
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Outcome of a failed pipeline stage or controller.
///
/// Every stage reports failure through one of these variants; the response
/// envelope turns them into the matching status code and body.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("{0}")]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    Server(ServerFailure),

    #[error("{message}")]
    Custom {
        code: u16,
        error_type: ErrorType,
        message: String,
        meta_data: Map<String, Value>,
    },
}

impl RouteError {
    /// Wrap any error as a 500, keeping its type name for `metaData`
    pub fn server<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RouteError::Server(ServerFailure::from_error(error))
    }

    pub fn server_message(message: impl Into<String>) -> Self {
        RouteError::Server(ServerFailure::Message(message.into()))
    }

    pub fn custom(code: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        RouteError::Custom {
            code,
            error_type: ErrorType::Custom(error_type.into()),
            message: message.into(),
            meta_data: Map::new(),
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            RouteError::Validation(_) => 400,
            RouteError::Unauthorized(_) => 401,
            RouteError::Server(_) => 500,
            RouteError::Custom { code, .. } => *code,
        }
    }
}

impl From<anyhow::Error> for RouteError {
    fn from(error: anyhow::Error) -> Self {
        RouteError::Server(ServerFailure::from(error))
    }
}

impl From<ValidationErrors> for RouteError {
    fn from(errors: ValidationErrors) -> Self {
        RouteError::Validation(errors)
    }
}
