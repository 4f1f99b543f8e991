//! Port interface for token persistence
//!
//! The engine never touches cookies, local storage or keychains directly; the
//! host supplies a [`TokenStore`] and the engine reads and writes the two
//! session tokens through it.

use async_trait::async_trait;
use bizberry_domain::StoreError;

/// Per-value storage options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Value should outlive the current process/session
    pub is_persistent: bool,
}

impl StoreOptions {
    pub const fn persistent() -> Self {
        Self { is_persistent: true }
    }

    pub const fn transient() -> Self {
        Self { is_persistent: false }
    }
}

/// Trait for string-keyed secret storage
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str, options: StoreOptions) -> Result<(), StoreError>;

    /// Remove a value; removing an absent key is not an error
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}
