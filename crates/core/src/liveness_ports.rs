//! Port interface for host liveness signals
//!
//! Hosts report when the application regains focus or visibility so the
//! engine can refresh tokens opportunistically. How the signal is detected
//! (window events, app lifecycle callbacks) stays on the host side.

use std::fmt;
use std::sync::Arc;

/// Callback invoked whenever the host becomes active.
pub type LivenessListener = Arc<dyn Fn() + Send + Sync>;

/// Source of "host became active" notifications.
pub trait Liveness: Send + Sync {
    /// Register `listener`; dropping the returned [`Subscription`]
    /// unregisters it.
    fn subscribe(&self, listener: LivenessListener) -> Subscription;

    /// Whether the host is currently active (focused/visible).
    fn is_active(&self) -> bool {
        true
    }
}

/// Handle returned by [`Liveness::subscribe`].
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// A subscription with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}
