//! Refresh on host activity
//!
//! Mounting a [`Liveness`] source makes every "host became active" signal
//! trigger a `refresh_if_needed`. Signals arriving while a refresh is still
//! running are dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bizberry_core::{Liveness, LivenessListener, Subscription};
use bizberry_domain::{ApiError, Result};
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info};

use super::client::ApiClient;

impl ApiClient {
    /// Subscribe to `liveness`, replacing any previous mount.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` when called outside a Tokio runtime.
    pub fn mount(&self, liveness: &dyn Liveness) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| {
            ApiError::Config("mounting requires a running Tokio runtime".to_string())
        })?;

        let client = Arc::downgrade(&self.inner);
        let in_flight = Arc::clone(&self.inner.liveness_refreshing);
        let listener: LivenessListener = Arc::new(move || {
            let Some(inner) = client.upgrade() else {
                return;
            };
            if in_flight.swap(true, Ordering::AcqRel) {
                debug!("refresh already running, ignoring activity signal");
                return;
            }
            let in_flight = Arc::clone(&in_flight);
            runtime.spawn(async move {
                ApiClient { inner }.refresh_if_needed().await;
                in_flight.store(false, Ordering::Release);
            });
        });

        let subscription = liveness.subscribe(listener);
        // Dropping the previous subscription unsubscribes it
        let previous = self.inner.liveness.lock().replace(subscription);
        drop(previous);
        info!("liveness source mounted");
        Ok(())
    }

    /// Stop reacting to liveness signals. Returns `false` if nothing was
    /// mounted.
    pub fn unmount(&self) -> bool {
        let Some(subscription) = self.inner.liveness.lock().take() else {
            return false;
        };
        subscription.unsubscribe();
        info!("liveness source unmounted");
        true
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.liveness.lock().is_some()
    }
}

#[derive(Default)]
struct ManualInner {
    listeners: RwLock<Vec<(u64, LivenessListener)>>,
    next_id: AtomicU64,
    inactive: AtomicBool,
}

/// [`Liveness`] driven by explicit calls from the host.
///
/// Hosts wire their own focus or lifecycle events to [`notify`] or
/// [`set_active`].
///
/// [`notify`]: ManualLiveness::notify
/// [`set_active`]: ManualLiveness::set_active
#[derive(Clone, Default)]
pub struct ManualLiveness {
    inner: Arc<ManualInner>,
}

impl ManualLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that the host became active.
    pub fn notify(&self) {
        let listeners: Vec<LivenessListener> =
            self.inner.listeners.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener();
        }
    }

    /// Record the activity state; becoming active notifies listeners.
    pub fn set_active(&self, active: bool) {
        self.inner.inactive.store(!active, Ordering::Release);
        if active {
            self.notify();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl Liveness for ManualLiveness {
    fn subscribe(&self, listener: LivenessListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, listener));

        let inner: Weak<ManualInner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.write().retain(|(other, _)| *other != id);
            }
        })
    }

    fn is_active(&self) -> bool {
        !self.inner.inactive.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ManualLiveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualLiveness")
            .field("listeners", &self.listener_count())
            .field("active", &self.is_active())
            .finish()
    }
}
