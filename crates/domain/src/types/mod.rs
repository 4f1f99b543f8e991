//! Domain types and models

pub mod envelope;
pub mod params;
pub mod request;
pub mod token;

pub use envelope::{ErrorDetail, ErrorEnvelope};
pub use params::{ParamValue, QueryParams};
pub use request::{ApiRequest, ApiResponse, Blob, HttpMethod};
pub use token::{validate_token, validate_token_at, Token, TokenPayload};
