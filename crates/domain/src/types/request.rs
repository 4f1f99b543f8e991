//! Request and response value types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DEFAULT_RETRY_BUDGET;
use crate::impl_wire_name_conversions;
use crate::types::params::QueryParams;

/// HTTP verbs the engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl_wire_name_conversions!(HttpMethod {
    Get => "GET",
    Post => "POST",
    Put => "PUT",
    Patch => "PATCH",
    Delete => "DELETE",
});

/// One logical API call.
///
/// `retry_budget` bounds the whole call chain: auth recovery and transport
/// retries draw from the same budget. Requests issued by the token lifecycle
/// itself disable `auth_recovery` so a failing refresh cannot trigger another
/// refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub endpoint: String,
    pub params: QueryParams,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub authorized: bool,
    pub retry_budget: u8,
    pub auth_recovery: bool,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: QueryParams::new(),
            body: None,
            headers: Vec::new(),
            authorized: true,
            retry_budget: DEFAULT_RETRY_BUDGET,
            auth_recovery: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, endpoint)
    }

    #[must_use]
    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send without an `Authorization` header unless one is set explicitly.
    #[must_use]
    pub fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }

    #[must_use]
    pub fn retry_budget(mut self, budget: u8) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Surface auth failures as errors without refreshing, logging out or
    /// prompting.
    #[must_use]
    pub fn without_auth_recovery(mut self) -> Self {
        self.auth_recovery = false;
        self
    }

    /// Explicit `Authorization` header, matched case-insensitively.
    pub fn authorization_header(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
    }

    /// Endpoint with the serialized query string appended.
    pub fn path_and_query(&self) -> String {
        if self.params.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, self.params.to_query_string())
        }
    }
}

/// Opaque non-JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Result of a logically successful call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    Binary(Blob),
    /// `204 No Content`
    Empty,
}

impl ApiResponse {
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
