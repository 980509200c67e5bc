use serde_json::Value;
use std::sync::Mutex;

use crate::error::ErrorResponse;

/// Logging capability handed to the response envelope and the token service.
///
/// Components receive it at construction; nothing in the crate reaches for a
/// process-wide logger.
pub trait EventLog: Send + Sync {
    /// Record an error body right before it is written to the client
    fn log_error(&self, response: &ErrorResponse);

    fn warn(&self, message: &str);
}

/// Default capability: forwards to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl EventLog for TracingLog {
    fn log_error(&self, response: &ErrorResponse) {
        let meta_data = Value::Object(response.meta_data.clone());
        if response.code >= 500 {
            tracing::error!(
                code = response.code,
                error_type = %response.error_type,
                meta_data = %meta_data,
                "{}",
                response.message
            );
        } else {
            tracing::warn!(
                code = response.code,
                error_type = %response.error_type,
                "{}",
                response.message
            );
        }
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}

/// Keeps every event in memory. Handy for embedding services that want to
/// inspect what was reported, and for asserting on the log side effect.
#[derive(Debug, Default)]
pub struct MemoryLog {
    errors: Mutex<Vec<ErrorResponse>>,
    warnings: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<ErrorResponse> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl EventLog for MemoryLog {
    fn log_error(&self, response: &ErrorResponse) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(response.clone());
        }
    }

    fn warn(&self, message: &str) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(message.to_string());
        }
    }
}
