pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod route;
pub mod validation;

pub use auth::{AuthError, AuthTokenService, TokenCodec, TokenGrant};
pub use config::{AppConfig, AuthConfig, ConfigError, ServerConfig};
pub use error::{ErrorResponse, ErrorType, RouteError, ServerFailure};
pub use logging::{EventLog, TracingLog};
pub use middleware::{AuthenticationGate, Reply, ResponseEnvelope, TokenLocation};
pub use route::{
    with_validation, CompileError, Controller, HandlerResult, Location, Middleware, Pipeline, RequestContext,
    RouteCompiler, RouteDescriptor, RouteMethod, SessionData,
};
pub use validation::{build_checker, FieldChecker, ParameterSpec, ParameterType, ValidationErrors};
