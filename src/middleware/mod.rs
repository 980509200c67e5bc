pub mod auth;
pub mod response;

pub use auth::{AuthenticationGate, TokenLocation};
pub use response::{Reply, ResponseEnvelope};
