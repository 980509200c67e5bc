use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::validation::ValidationErrors;

/// Decoded session payload carried by a token
pub type SessionData = Map<String, Value>;

/// Request part a parameter can arrive in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Body,
    Params,
    Query,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Body, Location::Params, Location::Query];
}

/// Per-request state threaded through every pipeline stage.
///
/// The pruning stage rewrites `body`, `params` and `query`, validators coerce
/// values in place and record failures in `validation`, and the
/// authentication gate stores the decoded session.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Map<String, Value>,
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub validation: ValidationErrors,
    session: Option<SessionData>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Map::new(),
            params: Map::new(),
            query: Map::new(),
            validation: ValidationErrors::new(),
            session: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn location(&self, location: Location) -> &Map<String, Value> {
        match location {
            Location::Body => &self.body,
            Location::Params => &self.params,
            Location::Query => &self.query,
        }
    }

    pub fn location_mut(&mut self, location: Location) -> &mut Map<String, Value> {
        match location {
            Location::Body => &mut self.body,
            Location::Params => &mut self.params,
            Location::Query => &mut self.query,
        }
    }

    /// All declared input merged into one mapping; body wins over path
    /// params, which win over the query string.
    pub fn input(&self) -> Map<String, Value> {
        let mut merged = self.query.clone();
        merged.extend(self.params.clone());
        merged.extend(self.body.clone());
        merged
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// Session stored by the authentication gate; `None` on open routes
    pub fn session(&self) -> Option<&SessionData> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: SessionData) {
        self.session = Some(session);
    }

    /// Decode the session into a caller-defined user type
    pub fn authenticated_user<T: DeserializeOwned>(&self) -> Option<T> {
        let session = self.session.as_ref()?;
        serde_json::from_value(Value::Object(session.clone())).ok()
    }
}
