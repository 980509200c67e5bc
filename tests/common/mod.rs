#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use route_pipeline::config::AppConfig;
use route_pipeline::handlers;
use route_pipeline::logging::MemoryLog;

pub const SECRET: &str = "integration-test-secret";

/// Configuration as the binary would load it, from an in-memory environment
pub fn config_with(pairs: &[(&str, &str)]) -> Result<AppConfig> {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("JWT_SECRET".to_string(), SECRET.to_string());
    for (key, value) in pairs {
        env.insert(key.to_string(), value.to_string());
    }
    Ok(AppConfig::from_lookup(|key| env.get(key).cloned())?)
}

pub fn config() -> Result<AppConfig> {
    config_with(&[])
}

/// Reference application plus the log it reports into
pub fn app() -> Result<(Router, Arc<MemoryLog>)> {
    let log = Arc::new(MemoryLog::new());
    let router = handlers::app_with_log(&config()?, log.clone())?;
    Ok((router, log))
}

/// Drive one request through the router and decode the JSON reply
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    send_request(app, request).await
}

pub async fn send_request(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body with status {}", status))?
    };
    Ok((status, json))
}

/// Log in through POST /session and return the issued token
pub async fn login(app: &Router, username: &str) -> Result<String> {
    let (status, body) = send(
        app,
        Method::POST,
        "/session",
        None,
        Some(serde_json::json!({ "username": username, "password": "hunter2" })),
    )
    .await?;
    anyhow::ensure!(status == StatusCode::OK, "login failed with {}: {}", status, body);

    body["token"]
        .as_str()
        .map(str::to_string)
        .context("login reply carried no token")
}
