//! Background token refresh
//!
//! Keeps the transaction token fresh on a fixed interval. The task holds a
//! weak reference to the client, so it never keeps a dropped client alive
//! and exits once the last handle is gone.

use std::sync::{Arc, Weak};
use std::time::Duration;

use bizberry_domain::{ApiError, Result};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::{ApiClient, ClientInner};

/// How long `stop_auto_refresh` waits for the task to wind down.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Running refresh loop.
pub(crate) struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl ApiClient {
    /// Start refreshing the transaction token every
    /// `auto_refresh_interval_secs`.
    ///
    /// Returns `false` if a refresh loop is already running.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Config` when called outside a Tokio runtime.
    #[instrument(skip(self))]
    pub fn start_auto_refresh(&self) -> Result<bool> {
        let runtime = Handle::try_current().map_err(|_| {
            ApiError::Config("auto refresh requires a running Tokio runtime".to_string())
        })?;

        let mut slot = self.inner.auto_refresh.lock();
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            debug!("auto refresh already running");
            return Ok(false);
        }

        let interval = self.config().auto_refresh_interval();
        let cancel = CancellationToken::new();
        let handle =
            runtime.spawn(refresh_loop(Arc::downgrade(&self.inner), interval, cancel.clone()));
        *slot = Some(RefreshTask { cancel, handle });

        info!(interval_secs = interval.as_secs(), "auto refresh started");
        Ok(true)
    }

    /// Stop the refresh loop and wait for it to finish.
    ///
    /// Returns `false` if no loop was running.
    #[instrument(skip(self))]
    pub async fn stop_auto_refresh(&self) -> bool {
        let Some(task) = self.inner.auto_refresh.lock().take() else {
            return false;
        };

        task.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, task.handle).await {
            Ok(Ok(())) => info!("auto refresh stopped"),
            Ok(Err(e)) => warn!("auto refresh task panicked: {}", e),
            Err(_) => warn!("auto refresh task did not complete within timeout"),
        }
        true
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner.auto_refresh.lock().as_ref().is_some_and(|task| !task.handle.is_finished())
    }
}

async fn refresh_loop(client: Weak<ClientInner>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("auto refresh cancelled");
                break;
            }
            _ = ticker.tick() => {
                let Some(inner) = client.upgrade() else {
                    debug!("client dropped, auto refresh exiting");
                    break;
                };
                let client = ApiClient { inner };
                if client.refresh_if_needed().await.is_some() {
                    debug!("auto refresh renewed the transaction token");
                }
            }
        }
    }
}
