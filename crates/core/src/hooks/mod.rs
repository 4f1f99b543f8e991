//! Named hook registry
//!
//! Hooks let the host application plug interactive behaviour into the engine
//! (for example prompting the user for a password before a critical
//! operation) without the engine knowing anything about UI.
//!
//! Each hook name maps to an ordered list of callbacks. Calling a name with
//! no registrations yields an empty result list.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Failure reported by a hook callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The user dismissed the interaction
    #[error("hook '{0}' was cancelled")]
    Cancelled(String),

    /// The callback failed
    #[error("hook '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// A host-supplied callback.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, args: &[Value]) -> Result<Value, HookError>;
}

/// Shared handle to a registered hook; also the identity used by
/// [`HookRegistry::del_hook`].
pub type HookHandle = Arc<dyn Hook>;

struct FnHook<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Hook for FnHook<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HookError>> + Send,
{
    async fn call(&self, args: &[Value]) -> Result<Value, HookError> {
        (self.f)(args.to_vec()).await
    }
}

/// Wrap an async closure as a [`HookHandle`].
pub fn hook_fn<F, Fut>(f: F) -> HookHandle
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HookError>> + Send + 'static,
{
    Arc::new(FnHook { f })
}

/// Registry of named, ordered hook lists.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Vec<HookHandle>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` to `name`. With `override_existing`, prior
    /// registrations for `name` are dropped first.
    pub fn add_hook(&self, name: &str, hook: HookHandle, override_existing: bool) {
        let mut hooks = self.hooks.write();
        let list = hooks.entry(name.to_string()).or_default();
        if override_existing {
            list.clear();
        }
        list.push(hook);
        debug!(hook = name, registered = list.len(), "hook added");
    }

    /// Remove `hook` from `name`. Returns whether it was registered.
    pub fn del_hook(&self, name: &str, hook: &HookHandle) -> bool {
        let mut hooks = self.hooks.write();
        let Some(list) = hooks.get_mut(name) else {
            return false;
        };

        let before = list.len();
        list.retain(|registered| !Arc::ptr_eq(registered, hook));
        let removed = list.len() != before;
        if list.is_empty() {
            hooks.remove(name);
        }
        removed
    }

    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.read().get(name).is_some_and(|list| !list.is_empty())
    }

    /// Invoke every callback registered for `name`, in registration order.
    ///
    /// # Errors
    /// Returns the first [`HookError`]; later callbacks are not invoked.
    pub async fn call_hook(&self, name: &str, args: &[Value]) -> Result<Vec<Value>, HookError> {
        // Snapshot so callbacks may (de)register hooks without deadlocking
        let callbacks: Vec<HookHandle> = self.hooks.read().get(name).cloned().unwrap_or_default();

        let mut results = Vec::with_capacity(callbacks.len());
        for callback in callbacks {
            results.push(callback.call(args).await?);
        }
        Ok(results)
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let counts: HashMap<&str, usize> =
            hooks.iter().map(|(name, list)| (name.as_str(), list.len())).collect();
        f.debug_struct("HookRegistry").field("hooks", &counts).finish()
    }
}
