// Registration of compiled pipelines into an axum Router
use axum::{
    body::to_bytes,
    extract::{Path, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::compiler::{CompileError, Pipeline, RouteCompiler};
use super::context::RequestContext;
use super::{RouteDescriptor, RouteMethod};
use crate::error::{ErrorType, RouteError, ServerFailure};

impl RouteMethod {
    fn filter(&self) -> MethodFilter {
        match self {
            RouteMethod::Get => MethodFilter::GET,
            RouteMethod::Post => MethodFilter::POST,
            RouteMethod::Patch => MethodFilter::PATCH,
            RouteMethod::Delete => MethodFilter::DELETE,
        }
    }
}

impl RouteCompiler {
    /// Compile every descriptor and register it on `router`.
    ///
    /// Descriptors sharing a path are merged into one method router. Any
    /// compile failure aborts the whole registration, and so does a path the
    /// router refuses (for instance a method and path it already serves).
    pub fn mount<I>(&self, router: Router, routes: I) -> Result<Router, CompileError>
    where
        I: IntoIterator<Item = RouteDescriptor>,
    {
        let mut by_path: BTreeMap<String, (MethodRouter, Vec<RouteMethod>)> = BTreeMap::new();

        for descriptor in routes {
            let pipeline = Arc::new(self.compile(&descriptor)?);
            let (method_router, methods) = by_path
                .remove(&descriptor.path)
                .unwrap_or_else(|| (MethodRouter::new(), Vec::new()));

            if methods.contains(&descriptor.method) {
                return Err(CompileError::DuplicateRoute {
                    method: descriptor.method,
                    path: descriptor.path,
                });
            }

            let handler = move |params: Option<Path<HashMap<String, String>>>, request: Request| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.dispatch(params, request).await }
            };

            let mut methods = methods;
            methods.push(descriptor.method);
            by_path.insert(
                descriptor.path,
                (method_router.on(descriptor.method.filter(), handler), methods),
            );
        }

        let mut router = router;
        for (path, (method_router, methods)) in by_path {
            // axum panics on conflicting registrations; keep a copy to report from
            let candidate = router.clone();
            router = catch_unwind(AssertUnwindSafe(|| candidate.route(&path, method_router))).map_err(|panic| {
                CompileError::Rejected {
                    path: path.clone(),
                    reason: ServerFailure::from_panic(panic).message(),
                }
            })?;

            let methods: Vec<String> = methods.iter().map(RouteMethod::to_string).collect();
            tracing::info!("Mounted {} {}", methods.join(","), path);
        }
        Ok(router)
    }
}

impl Pipeline {
    /// Translate an axum request into a `RequestContext` and run the pipeline.
    ///
    /// An unreadable or malformed body leaves the body mapping empty; its
    /// error is raised by the pipeline after authentication.
    pub async fn dispatch(&self, params: Option<Path<HashMap<String, String>>>, request: Request) -> Response {
        let (parts, body) = request.into_parts();

        let (body, rejected) = match self.read_body(body).await {
            Ok(body) => (body, None),
            Err(err) => (Map::new(), Some(err)),
        };

        let params = params
            .map(|Path(params)| {
                params
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect()
            })
            .unwrap_or_default();

        let ctx = RequestContext::new(parts.method, parts.uri.path())
            .with_headers(parts.headers)
            .with_query(parse_query(parts.uri.query()))
            .with_params(params)
            .with_body(body);

        self.run_with(ctx, rejected).await.into_response()
    }

    async fn read_body(&self, body: axum::body::Body) -> Result<Map<String, Value>, RouteError> {
        let bytes = to_bytes(body, self.max_body_bytes()).await.map_err(|e| {
            tracing::debug!("Failed to read body for {} {}: {}", self.method(), self.path(), e);
            body_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorType::Custom("PAYLOAD_TOO_LARGE".to_string()),
                format!("Request body exceeds {} bytes", self.max_body_bytes()),
            )
        })?;

        parse_body(&bytes)
            .map_err(|_| body_error(StatusCode::BAD_REQUEST, ErrorType::Validation, "Malformed JSON body".to_string()))
    }
}

fn body_error(status: StatusCode, error_type: ErrorType, message: String) -> RouteError {
    RouteError::Custom {
        code: status.as_u16(),
        error_type,
        message,
        meta_data: Map::new(),
    }
}

/// JSON object bodies become the body mapping; empty and non-object bodies
/// become an empty mapping
pub(crate) fn parse_body(bytes: &[u8]) -> Result<Map<String, Value>, serde_json::Error> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Decode a query string into a mapping.
///
/// Repeated keys and keys ending in `[]` produce arrays; everything else is a
/// string.
pub(crate) fn parse_query(query: Option<&str>) -> Map<String, Value> {
    let mut map = Map::new();
    let Some(query) = query else {
        return map;
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        let (key, forced_array) = match key.strip_suffix("[]") {
            Some(stripped) => (stripped.to_string(), true),
            None => (key.into_owned(), false),
        };

        match map.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None if forced_array => {
                map.insert(key, Value::Array(vec![value]));
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}
