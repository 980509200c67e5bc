// handlers/mod.rs - reference service built from route descriptors
//
// POST /session is open; every other declared route relies on the default
// secure flag. /health is a plain axum route outside the pipeline.

pub mod items;
pub mod session;

use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::AuthTokenService;
use crate::config::AppConfig;
use crate::logging::{EventLog, TracingLog};
use crate::middleware::response::ResponseEnvelope;
use crate::route::{RouteCompiler, RouteDescriptor};
use crate::validation::ParameterSpec;

/// Route table of the reference service
pub fn routes(service: &Arc<AuthTokenService>) -> Vec<RouteDescriptor> {
    vec![
        RouteDescriptor::post("/session", session::IssueSession::new(Arc::clone(service)))
            .public()
            .parameter("username", ParameterSpec::string())
            .parameter("password", ParameterSpec::string().optional()),
        RouteDescriptor::get("/session", session::current_session),
        RouteDescriptor::post("/items", items::create_item)
            .parameter("name", ParameterSpec::string())
            .parameter("qty", ParameterSpec::number().with_message("qty must be numeric"))
            .parameter("tags", ParameterSpec::array().optional())
            .parameter("draft", ParameterSpec::boolean().optional()),
        RouteDescriptor::get("/items", items::list_items)
            .parameter("tags", ParameterSpec::array().optional()),
        RouteDescriptor::patch("/items/:id", items::update_item)
            .parameter("id", ParameterSpec::string())
            .parameter("name", ParameterSpec::string().optional())
            .parameter("qty", ParameterSpec::number().optional()),
    ]
}

/// Build the full application router, logging through `tracing`
pub fn app(config: &AppConfig) -> anyhow::Result<Router> {
    app_with_log(config, Arc::new(TracingLog))
}

/// Build the application router around an explicit event log
pub fn app_with_log(config: &AppConfig, log: Arc<dyn EventLog>) -> anyhow::Result<Router> {
    let service = Arc::new(AuthTokenService::new(&config.auth, Arc::clone(&log))?);
    tracing::info!("Session tokens use the {} codec", service.codec());

    let compiler = RouteCompiler::new(Arc::new(ResponseEnvelope::new(log)))
        .with_auth(Arc::clone(&service))
        .with_body_limit(config.server.max_body_bytes);

    let router = Router::new().route("/health", get(health));
    let router = compiler.mount(router, routes(&service))?;

    Ok(router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http()))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
