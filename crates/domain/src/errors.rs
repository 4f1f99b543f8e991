//! Error types used throughout the SDK
//!
//! Every failure a caller can observe is an [`ApiError`]. Network failures and
//! backend error envelopes carry the same [`ErrorInfo`] record so callers can
//! branch on `status`, `error_type` and `code` without caring where the
//! failure came from.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::constants::{
    ERR_TYPE_AUTH, TRANSACTION_AUTH_ENDPOINT, TRANSPORT_ERROR_STATUS, UNKNOWN_ERROR_CODE,
};
use crate::types::{ErrorDetail, ErrorEnvelope, HttpMethod, QueryParams};

/// Failure to decode a bearer token payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token format")]
    Malformed,

    #[error("Invalid token encoding")]
    InvalidEncoding,

    #[error("Invalid token data: {0}")]
    InvalidPayload(String),
}

/// Failure reported by a token store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Full description of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorInfo {
    pub url: String,
    pub method: HttpMethod,
    pub params: QueryParams,
    /// HTTP status, or `-1` when no response was received
    pub status: i32,
    pub code: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: String,
    pub event_id: Option<String>,
    pub detail: Option<Value>,
    pub details: Option<Vec<ErrorDetail>>,
    pub loc: Option<Value>,
}

impl ErrorInfo {
    /// A failure with no response (status `-1`).
    pub fn transport(
        method: HttpMethod,
        url: impl Into<String>,
        params: QueryParams,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            method,
            params,
            status: TRANSPORT_ERROR_STATUS,
            code: UNKNOWN_ERROR_CODE.to_string(),
            error_type: None,
            message: message.into(),
            event_id: None,
            detail: None,
            details: None,
            loc: None,
        }
    }

    /// A failure described by a backend error envelope.
    pub fn from_envelope(
        method: HttpMethod,
        url: impl Into<String>,
        params: QueryParams,
        status: u16,
        envelope: &ErrorEnvelope,
    ) -> Self {
        let primary = envelope.primary.as_ref();
        let error_type = primary.and_then(|d| d.error_type.clone());
        let message = primary
            .and_then(ErrorDetail::text)
            .map(str::to_string)
            .or_else(|| error_type.clone())
            .unwrap_or_else(|| "Unknown error occurred".to_string());

        Self {
            url: url.into(),
            method,
            params,
            status: i32::from(status),
            code: primary
                .and_then(|d| d.code.clone())
                .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
            error_type,
            message,
            event_id: envelope.event_id.clone(),
            detail: primary.and_then(|d| d.detail.clone()),
            details: envelope.details.clone(),
            loc: primary.and_then(|d| d.loc.clone()),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bizberry-API call failed: {} {} {} - {} {} (code {})",
            self.method,
            self.url,
            self.params,
            self.status,
            self.error_type.as_deref().unwrap_or(&self.message),
            self.code
        )
    }
}

/// Stable classification of [`ApiError`] for logs and caller branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// Missing or invalid configuration - never retried
    Config,
    /// Token store failure
    Store,
    /// Authentication failures, after any recovery was attempted
    Authentication,
    /// No response received, after the transport retry
    Transport,
    /// Any other error envelope returned by the backend
    Backend,
}

/// The single error type surfaced by the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("{0}")]
    Auth(Box<ErrorInfo>),

    #[error("{0}")]
    Transport(Box<ErrorInfo>),

    #[error("{0}")]
    Backend(Box<ErrorInfo>),
}

impl ApiError {
    /// The fatal "no user token" failure of transaction-token issuance.
    pub fn missing_user_token() -> Self {
        let mut info = ErrorInfo::transport(
            HttpMethod::Post,
            TRANSACTION_AUTH_ENDPOINT,
            QueryParams::new(),
            "no user token",
        );
        info.error_type = Some(ERR_TYPE_AUTH.to_string());
        info.code = "no_user_token".to_string();
        Self::Auth(Box::new(info))
    }

    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Config(_) => ApiErrorCategory::Config,
            Self::Store(_) => ApiErrorCategory::Store,
            Self::Auth(_) => ApiErrorCategory::Authentication,
            Self::Transport(_) => ApiErrorCategory::Transport,
            Self::Backend(_) => ApiErrorCategory::Backend,
        }
    }

    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Auth(info) | Self::Transport(info) | Self::Backend(info) => Some(info),
            Self::Config(_) | Self::Store(_) => None,
        }
    }

    pub fn status(&self) -> Option<i32> {
        self.info().map(|i| i.status)
    }

    pub fn code(&self) -> Option<&str> {
        self.info().map(|i| i.code.as_str())
    }

    pub fn error_type(&self) -> Option<&str> {
        self.info().and_then(|i| i.error_type.as_deref())
    }

    /// Label suitable for structured log fields.
    pub fn label(&self) -> &'static str {
        match self.category() {
            ApiErrorCategory::Config => "config",
            ApiErrorCategory::Store => "store",
            ApiErrorCategory::Authentication => "auth",
            ApiErrorCategory::Transport => "transport",
            ApiErrorCategory::Backend => "backend",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.0)
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, ApiError>;
