// Route descriptor -> ordered pipeline of stages
use futures::FutureExt;
use serde_json::Map;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;

use super::context::{Location, RequestContext};
use super::{with_validation, Controller, HandlerResult, Middleware, RouteDescriptor, RouteMethod};
use crate::auth::AuthTokenService;
use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::error::{RouteError, ServerFailure};
use crate::middleware::auth::AuthenticationGate;
use crate::middleware::response::{Reply, ResponseEnvelope};
use crate::validation::{build_checker, FieldChecker};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("route {method} {path} is secure but no token service is configured")]
    MissingAuthentication { method: RouteMethod, path: String },

    #[error("route {method} {path}: {reason}")]
    InvalidPath {
        method: RouteMethod,
        path: String,
        reason: String,
    },

    #[error("route {method} {path}: parameter names must not be empty")]
    EmptyParameterName { method: RouteMethod, path: String },

    #[error("route {method} {path} is declared more than once")]
    DuplicateRoute { method: RouteMethod, path: String },

    /// The router refused the path, usually because it is already taken
    #[error("route {path} was rejected by the router: {reason}")]
    Rejected { path: String, reason: String },
}

/// One step of a compiled pipeline
#[derive(Clone)]
pub enum Stage {
    /// Keep only declared keys in body, path params and query
    Prune(Arc<[String]>),
    Authenticate(AuthenticationGate),
    Validate(FieldChecker),
    Middleware(Arc<dyn Middleware>),
    /// Terminal stage of routes without parameters
    Controller(Arc<dyn Controller>),
    /// Terminal stage that answers 400 instead of calling the controller
    /// when any validator recorded a failure
    ValidatedController(Arc<dyn Controller>),
}

/// Stage shape without its payload, for introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    Prune,
    Authenticate,
    Validate(String),
    Middleware,
    Controller,
    ValidatedController,
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Prune(_) => StageKind::Prune,
            Stage::Authenticate(_) => StageKind::Authenticate,
            Stage::Validate(checker) => StageKind::Validate(checker.name().to_string()),
            Stage::Middleware(_) => StageKind::Middleware,
            Stage::Controller(_) => StageKind::Controller,
            Stage::ValidatedController(_) => StageKind::ValidatedController,
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind())
    }
}

/// Compiled request pipeline for one route
#[derive(Debug)]
pub struct Pipeline {
    method: RouteMethod,
    path: String,
    stages: Vec<Stage>,
    envelope: Arc<ResponseEnvelope>,
    max_body_bytes: usize,
}

impl Pipeline {
    pub fn method(&self) -> RouteMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    pub fn envelope(&self) -> &ResponseEnvelope {
        &self.envelope
    }

    pub(crate) fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Run every stage for one request and render the outcome.
    ///
    /// Controller failures and panics both end up as envelope errors; nothing
    /// escapes this call.
    pub async fn run(&self, ctx: RequestContext) -> Reply {
        self.run_with(ctx, None).await
    }

    /// Like `run`, with a failure found while decoding the request. It is
    /// reported once the authentication stage has passed, so unauthenticated
    /// callers of secure routes always get a 401.
    pub(crate) async fn run_with(&self, ctx: RequestContext, rejected: Option<RouteError>) -> Reply {
        let request_id = ctx.request_id;
        match AssertUnwindSafe(self.execute(ctx, rejected)).catch_unwind().await {
            Ok(Ok(data)) => self.envelope.ok(data),
            Ok(Err(err)) => self.envelope.render(err),
            Err(panic) => {
                tracing::error!(
                    %request_id,
                    "Pipeline for {} {} panicked",
                    self.method,
                    self.path
                );
                self.envelope.server_error(ServerFailure::from_panic(panic))
            }
        }
    }

    async fn execute(&self, mut ctx: RequestContext, mut rejected: Option<RouteError>) -> HandlerResult {
        for stage in &self.stages {
            if !matches!(stage, Stage::Prune(_) | Stage::Authenticate(_)) {
                if let Some(err) = rejected.take() {
                    return Err(err);
                }
            }
            match stage {
                Stage::Prune(declared) => prune(&mut ctx, declared),
                Stage::Authenticate(gate) => gate.handle(&mut ctx).await?,
                Stage::Validate(checker) => checker.check(&mut ctx),
                Stage::Middleware(middleware) => middleware.handle(&mut ctx).await?,
                Stage::Controller(controller) => return controller.call(ctx).await,
                Stage::ValidatedController(controller) => {
                    return with_validation(ctx, controller.as_ref()).await
                }
            }
        }
        Err(RouteError::server_message(format!(
            "route {} {} has no controller stage",
            self.method, self.path
        )))
    }
}

/// Replace each request location with a mapping holding only declared keys
fn prune(ctx: &mut RequestContext, declared: &[String]) {
    for location in Location::ALL {
        let part = ctx.location_mut(location);
        let mut kept = Map::new();
        for name in declared {
            if let Some(value) = part.remove(name) {
                kept.insert(name.clone(), value);
            }
        }
        *part = kept;
    }
}

/// Path grammar the router accepts: a leading `/`, parameters (`:name`) and
/// catch-alls (`*name`) spanning whole segments, named, unique, with the
/// catch-all last.
fn check_path(path: &str) -> Result<(), String> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| "path must start with '/'".to_string())?;
    let segments: Vec<&str> = rest.split('/').collect();
    let mut names = HashSet::new();

    for (index, segment) in segments.iter().enumerate() {
        let (name, catch_all) = if let Some(name) = segment.strip_prefix(':') {
            (name, false)
        } else if let Some(name) = segment.strip_prefix('*') {
            (name, true)
        } else if segment.contains(&[':', '*'][..]) {
            return Err(format!("segment '{}' mixes literal text with a parameter", segment));
        } else {
            continue;
        };

        if name.is_empty() {
            return Err(format!("segment '{}' has no parameter name", segment));
        }
        if name.contains(&[':', '*'][..]) {
            return Err(format!("segment '{}' holds more than one parameter", segment));
        }
        if catch_all && index + 1 != segments.len() {
            return Err(format!("catch-all '{}' must be the last segment", segment));
        }
        if !names.insert(name) {
            return Err(format!("parameter '{}' appears more than once", name));
        }
    }
    Ok(())
}

/// Compiles route descriptors against a shared envelope and token service
#[derive(Debug, Clone)]
pub struct RouteCompiler {
    envelope: Arc<ResponseEnvelope>,
    gate: Option<AuthenticationGate>,
    max_body_bytes: usize,
}

impl RouteCompiler {
    pub fn new(envelope: Arc<ResponseEnvelope>) -> Self {
        Self {
            envelope,
            gate: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_auth(mut self, service: Arc<AuthTokenService>) -> Self {
        self.gate = Some(AuthenticationGate::new(service));
        self
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn envelope(&self) -> &Arc<ResponseEnvelope> {
        &self.envelope
    }

    /// Build the ordered stage list for one route:
    /// prune, authenticate (secure routes), one validator per parameter,
    /// user middlewares, then the controller (guarded by the validation
    /// result when the route declares parameters).
    pub fn compile(&self, descriptor: &RouteDescriptor) -> Result<Pipeline, CompileError> {
        check_path(&descriptor.path).map_err(|reason| CompileError::InvalidPath {
            method: descriptor.method,
            path: descriptor.path.clone(),
            reason,
        })?;
        if descriptor.parameter_names().any(|name| name.is_empty()) {
            return Err(CompileError::EmptyParameterName {
                method: descriptor.method,
                path: descriptor.path.clone(),
            });
        }

        let declared: Arc<[String]> = descriptor.parameter_names().map(str::to_string).collect();
        let mut stages = vec![Stage::Prune(declared)];

        if descriptor.secure {
            let gate = self.gate.clone().ok_or_else(|| CompileError::MissingAuthentication {
                method: descriptor.method,
                path: descriptor.path.clone(),
            })?;
            stages.push(Stage::Authenticate(gate));
        }

        for (name, spec) in &descriptor.parameters {
            stages.push(Stage::Validate(build_checker(name, spec)));
        }

        stages.extend(descriptor.middlewares.iter().cloned().map(Stage::Middleware));

        let controller = Arc::clone(&descriptor.controller);
        stages.push(if descriptor.parameters.is_empty() {
            Stage::Controller(controller)
        } else {
            Stage::ValidatedController(controller)
        });

        tracing::debug!(
            "Compiled {} {} into {} stages",
            descriptor.method,
            descriptor.path,
            stages.len()
        );

        Ok(Pipeline {
            method: descriptor.method,
            path: descriptor.path.clone(),
            stages,
            envelope: Arc::clone(&self.envelope),
            max_body_bytes: self.max_body_bytes,
        })
    }
}
