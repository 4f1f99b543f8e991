//! # Bizberry Infrastructure
//!
//! The request engine and its I/O adapters.
//!
//! This crate contains:
//! - [`ApiClient`]: authenticated dispatch, auth recovery and relation
//!   enrichment
//! - HTTP transport on top of `reqwest`
//! - An in-memory [`TokenStore`](bizberry_core::TokenStore)
//! - Configuration loading and tracing setup
//!
//! ## Architecture
//! - Implements the ports defined in `bizberry-core`
//! - Contains all "impure" code (network, environment, files)

pub mod api;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod store;

// Re-export commonly used items
pub use api::{ApiClient, ApiClientBuilder, ManualLiveness, Session, SessionTokens};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use observability::{init_tracing, LogFormat};
pub use store::MemoryTokenStore;
