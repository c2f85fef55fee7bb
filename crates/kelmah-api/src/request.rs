// Request/response value types shared by every pipeline layer.
//
// An `ApiRequest` is immutable once built so that auth recovery and the
// retry policy can replay it verbatim.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

/// A logical request against the backend, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base (e.g. `"proposals"`, `"quick-jobs/42"`).
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Whether the transport should attach the bearer token.
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter only when `value` is present.
    pub fn param_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send without the bearer token (login, token refresh).
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// A successful (2xx) response with its JSON body already read.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// The `X-Request-ID` sent with the request that produced this response.
    pub request_id: String,
    /// Parsed body; `Value::Null` for empty bodies (e.g. 204).
    pub body: Value,
}

impl ApiResponse {
    /// Deserialize the body into a concrete type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.body.clone()).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: self.body.to_string(),
        })
    }
}
