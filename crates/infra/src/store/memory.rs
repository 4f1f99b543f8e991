//! In-process token store
//!
//! Suitable for tests, CLIs and hosts that persist tokens themselves. The
//! persistence flag is recorded but not acted upon.

use std::collections::HashMap;

use async_trait::async_trait;
use bizberry_core::{StoreOptions, TokenStore};
use bizberry_domain::StoreError;
use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    persistent: bool,
}

/// [`TokenStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    values: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, for hosts and tests.
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.read().get(key).map(|stored| stored.value.clone())
    }

    /// Persistence flag the value was written with.
    pub fn is_persistent(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).map(|stored| stored.persistent)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str, options: StoreOptions) -> Result<(), StoreError> {
        self.values.write().insert(
            key.to_string(),
            StoredValue { value: value.to_string(), persistent: options.is_persistent },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.get("token_user").await.unwrap(), None);

        store.set("token_user", "U", StoreOptions::persistent()).await.unwrap();
        assert_eq!(store.get("token_user").await.unwrap().as_deref(), Some("U"));
        assert_eq!(store.is_persistent("token_user"), Some(true));

        store.set("token_user", "U2", StoreOptions::transient()).await.unwrap();
        assert_eq!(store.value("token_user").as_deref(), Some("U2"));
        assert_eq!(store.is_persistent("token_user"), Some(false));

        store.del("token_user").await.unwrap();
        store.del("token_user").await.unwrap();
        assert!(store.is_empty());
    }
}
