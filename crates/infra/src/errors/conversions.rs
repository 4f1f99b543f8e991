//! Conversions from external infrastructure errors into domain errors.

use bizberry_domain::{ApiError, ErrorInfo, HttpMethod, QueryParams};
use reqwest::Error as HttpError;
use thiserror::Error;

/// A transport failure that has not yet been attributed to a request.
///
/// The HTTP layer only knows the reqwest error; the dispatcher attaches the
/// method, endpoint and params before surfacing it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct InfraError {
    message: String,
    transient: bool,
}

impl InfraError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), transient: false }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the failure looks like a network blip (timeout, refused
    /// connection) rather than a malformed request.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Attach request context and produce the status `-1` transport error.
    pub fn into_api_error(
        self,
        method: HttpMethod,
        endpoint: &str,
        params: &QueryParams,
    ) -> ApiError {
        ApiError::Transport(Box::new(ErrorInfo::transport(
            method,
            endpoint,
            params.clone(),
            self.message,
        )))
    }
}

impl From<HttpError> for InfraError {
    fn from(err: HttpError) -> Self {
        let transient = is_transient(&err);
        let message = if err.is_timeout() {
            "Network error: request timed out".to_string()
        } else if err.is_connect() {
            format!("Network error: connection failed: {err}")
        } else if err.is_decode() || err.is_body() {
            format!("Network error: failed to read response body: {err}")
        } else {
            format!("Network error: {err}")
        };
        Self { message, transient }
    }
}

fn is_transient(err: &HttpError) -> bool {
    if err.is_timeout() || err.is_request() {
        return true;
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        if err.is_connect() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_api_error_is_transport_minus_one() {
        let err = InfraError::new("Network error: boom").into_api_error(
            HttpMethod::Get,
            "/widgets",
            &QueryParams::new().with("page", 2_i64),
        );

        assert_eq!(err.status(), Some(-1));
        assert_eq!(err.code(), Some("-1"));
        let info = err.info().unwrap();
        assert_eq!(info.url, "/widgets");
        assert_eq!(info.message, "Network error: boom");
        assert_eq!(info.params.to_query_string(), "page=2");
    }

    #[test]
    fn test_display_and_source() {
        let err = InfraError::new("Network error: reset");
        assert_eq!(err.to_string(), "Network error: reset");

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new().get(format!("http://{addr}")).send().await.unwrap_err();
        let infra = InfraError::from(err);
        assert!(infra.is_transient());
        assert!(infra.message().starts_with("Network error"));
    }
}
