//! # Bizberry Domain
//!
//! Data types shared by every Bizberry SDK crate.
//!
//! This crate contains:
//! - Token payload decoding and expiry validation
//! - The backend error envelope and the normalized [`ApiError`]
//! - Request/response value types and query parameter serialization
//! - SDK configuration structures and wire constants
//!
//! ## Architecture
//! - No dependencies on other Bizberry crates
//! - No I/O: everything here is pure data and pure functions

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
