//! SDK configuration structures

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_AUTO_REFRESH_SECS, DEFAULT_RELATION_DEPTH, DEFAULT_RELATION_SERVICE,
    DEFAULT_SAFETY_INTERVAL_MS, DEFAULT_TIMEOUT_SECS,
};

/// Static configuration of one SDK engine instance.
///
/// `url` is optional on purpose: a missing base URL is reported as a
/// configuration error on the first request rather than at load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Backend base URL (e.g. `https://api.bizberry.example`)
    pub url: Option<String>,
    /// Tenant identifier injected into login requests
    pub tenant: String,
    /// Per-request transport timeout
    pub timeout_secs: u64,
    /// Tokens expiring within this margin are considered invalid
    pub safety_interval_ms: u64,
    /// Maximum nesting depth explored by relation enrichment
    pub relation_depth: usize,
    /// Service prefix of `$rel` templates that point at this backend
    pub relation_service: String,
    /// Resolved relations older than this are fetched again
    pub relation_ttl_secs: Option<u64>,
    /// Period of the background `refresh_if_needed` loop
    pub auto_refresh_interval_secs: u64,
    /// Optional `User-Agent` header
    pub user_agent: Option<String>,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            url: None,
            tenant: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            safety_interval_ms: DEFAULT_SAFETY_INTERVAL_MS,
            relation_depth: DEFAULT_RELATION_DEPTH,
            relation_service: DEFAULT_RELATION_SERVICE.to_string(),
            relation_ttl_secs: None,
            auto_refresh_interval_secs: DEFAULT_AUTO_REFRESH_SECS,
            user_agent: None,
        }
    }
}

impl SdkConfig {
    /// Create a configuration for `url` and `tenant` with default tuning.
    pub fn new(url: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self { url: Some(url.into()), tenant: tenant.into(), ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn safety_interval(&self) -> Duration {
        Duration::from_millis(self.safety_interval_ms)
    }

    pub fn relation_ttl(&self) -> Option<Duration> {
        self.relation_ttl_secs.map(Duration::from_secs)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_secs.max(1))
    }
}
