//! Authenticated API engine
//!
//! [`ApiClient`] sends requests to the backend, keeps the user and
//! transaction tokens alive, recovers from authentication failures and
//! expands `$rel` references in responses.
//!
//! # Layout
//!
//! - `auth`: token lifecycle (login, transaction token issuance, logout)
//! - `classify`: maps failed responses onto recovery actions
//! - `client`: the dispatcher and the public request surface
//! - `relations`: relation cache and response enrichment
//! - `scheduler`: periodic background refresh
//! - `liveness`: refresh when the host becomes active

pub mod auth;
pub mod classify;
pub mod client;
pub mod liveness;
pub mod relations;
pub mod scheduler;

pub use auth::{AuthTransport, SessionTokens, TokenManager};
pub use classify::{classify, AuthAction};
pub use client::{ApiClient, ApiClientBuilder, Session};
pub use liveness::ManualLiveness;
pub use relations::{Fetched, RelationCache, RelationFetch};
