pub mod compiler;
pub mod context;
pub mod mount;

use async_trait::async_trait;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::RouteError;
use crate::validation::ParameterSpec;

pub use compiler::{CompileError, Pipeline, RouteCompiler, Stage, StageKind};
pub use context::{Location, RequestContext, SessionData};

/// What a controller returns: a JSON body for a 200, or a failure
pub type HandlerResult = Result<Value, RouteError>;

/// HTTP methods a route can be declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl RouteMethod {
    pub fn as_http(&self) -> Method {
        match self {
            RouteMethod::Get => Method::GET,
            RouteMethod::Post => Method::POST,
            RouteMethod::Patch => Method::PATCH,
            RouteMethod::Delete => Method::DELETE,
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_http().as_str())
    }
}

/// Terminal request handler
#[async_trait]
pub trait Controller: Send + Sync {
    async fn call(&self, ctx: RequestContext) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Controller for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn call(&self, ctx: RequestContext) -> HandlerResult {
        (self)(ctx).await
    }
}

/// A stage that may inspect or rewrite the request, or stop the pipeline
/// by returning an error
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), RouteError>;
}

#[async_trait]
impl<F> Middleware for F
where
    F: Fn(&mut RequestContext) -> Result<(), RouteError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut RequestContext) -> Result<(), RouteError> {
        (self)(ctx)
    }
}

/// Declarative endpoint description, compiled once into a `Pipeline`
#[derive(Clone)]
pub struct RouteDescriptor {
    pub method: RouteMethod,
    pub path: String,
    /// Routes are authenticated unless explicitly opened
    pub secure: bool,
    pub controller: Arc<dyn Controller>,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Declared parameters, in declaration order
    pub parameters: Vec<(String, ParameterSpec)>,
}

impl RouteDescriptor {
    pub fn new<C>(method: RouteMethod, path: impl Into<String>, controller: C) -> Self
    where
        C: Controller + 'static,
    {
        Self {
            method,
            path: path.into(),
            secure: true,
            controller: Arc::new(controller),
            middlewares: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn get<C: Controller + 'static>(path: impl Into<String>, controller: C) -> Self {
        Self::new(RouteMethod::Get, path, controller)
    }

    pub fn post<C: Controller + 'static>(path: impl Into<String>, controller: C) -> Self {
        Self::new(RouteMethod::Post, path, controller)
    }

    pub fn patch<C: Controller + 'static>(path: impl Into<String>, controller: C) -> Self {
        Self::new(RouteMethod::Patch, path, controller)
    }

    pub fn delete<C: Controller + 'static>(path: impl Into<String>, controller: C) -> Self {
        Self::new(RouteMethod::Delete, path, controller)
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Shorthand for `secure(false)`
    pub fn public(self) -> Self {
        self.secure(false)
    }

    /// Declare a parameter; redeclaring a name replaces its spec in place
    pub fn parameter(mut self, name: impl Into<String>, spec: ParameterSpec) -> Self {
        let name = name.into();
        match self.parameters.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = spec,
            None => self.parameters.push((name, spec)),
        }
        self
    }

    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("middlewares", &self.middlewares.len())
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// Run `controller` only when no validation failure has been recorded;
/// otherwise hand the accumulated failures back as one error
pub async fn with_validation(ctx: RequestContext, controller: &dyn Controller) -> HandlerResult {
    if ctx.validation.is_empty() {
        controller.call(ctx).await
    } else {
        Err(RouteError::Validation(ctx.validation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn echo(ctx: RequestContext) -> HandlerResult {
        Ok(Value::Object(ctx.input()))
    }

    #[test]
    fn routes_are_secure_by_default() {
        let route = RouteDescriptor::get("/items", echo);
        assert!(route.secure);
        assert!(!route.public().secure);
    }

    #[test]
    fn redeclared_parameters_keep_their_position() {
        let route = RouteDescriptor::post("/items", echo)
            .parameter("name", ParameterSpec::string())
            .parameter("qty", ParameterSpec::number())
            .parameter("name", ParameterSpec::string().optional());

        assert_eq!(route.parameter_names().collect::<Vec<_>>(), ["name", "qty"]);
        assert!(route.parameters[0].1.optional);
    }

    #[test]
    fn methods_map_to_http() {
        assert_eq!(RouteMethod::Patch.as_http(), Method::PATCH);
        assert_eq!(serde_json::to_value(RouteMethod::Delete).unwrap(), json!("DELETE"));
    }

    #[tokio::test]
    async fn with_validation_guards_the_controller() {
        let ctx = RequestContext::new(Method::POST, "/items");
        assert!(with_validation(ctx, &echo).await.is_ok());

        let mut ctx = RequestContext::new(Method::POST, "/items");
        crate::validation::build_checker("name", &ParameterSpec::string()).check(&mut ctx);
        let err = with_validation(ctx, &echo).await.unwrap_err();
        assert!(matches!(err, RouteError::Validation(ref e) if e.contains_field("name")));
    }
}
