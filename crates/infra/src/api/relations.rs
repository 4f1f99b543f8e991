//! Relation enrichment
//!
//! Successful JSON responses are walked for objects carrying `$rel`. Each
//! relation is fetched through the dispatcher and merged into its object.
//!
//! [`RelationCache`] deduplicates fetches: the pending future for a key is
//! registered before anything is awaited, so concurrent walkers that meet the
//! same relation join one request. A failed fetch removes its entry so the
//! next walk tries again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bizberry_core::{merge_relation, relation_template, RelationTarget, Scope, TemplateError};
use bizberry_domain::{ApiError, ApiRequest, ApiResponse};
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::client::ApiClient;

/// Future producing one relation document.
pub type RelationFetch = BoxFuture<'static, Result<Value, ApiError>>;
type SharedFetch = Shared<RelationFetch>;

enum Slot {
    Pending(SharedFetch),
    Ready(Value),
}

struct CacheEntry {
    slot: Slot,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    generation: u64,
}

/// A resolved relation document with its cache timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// Fetched JSON document.
    pub value: Value,
    /// When the fetch was started.
    pub created_at: DateTime<Utc>,
    /// When the document arrived.
    pub updated_at: DateTime<Utc>,
}

enum Claim {
    Ready(Fetched),
    Await { fetch: SharedFetch, generation: u64, created_at: DateTime<Utc> },
}

/// Per-key memo of relation fetches.
///
/// Without a TTL an entry only lives while its request is in flight. With a
/// TTL, resolved documents are served from memory until they are older than
/// the TTL.
pub struct RelationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Option<Duration>,
    next_generation: AtomicU64,
}

impl RelationCache {
    /// Empty cache; `None` keeps entries only while in flight.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), ttl, next_generation: AtomicU64::new(1) }
    }

    /// Configured lifetime of resolved entries.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Number of cached or in-flight entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is cached or in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether `key` is cached or in flight.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Drop every entry. In-flight fetches still complete for the walkers
    /// already awaiting them, but their results are not stored.
    pub fn reset(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            debug!(entries = entries.len(), "relation cache reset");
        }
        entries.clear();
    }

    /// Resolve `key`, joining an in-flight fetch or starting one with `fetch`.
    ///
    /// # Errors
    /// Returns the error of the underlying fetch; the entry is removed.
    pub async fn resolve<F>(&self, key: &str, fetch: F) -> Result<Fetched, ApiError>
    where
        F: FnOnce() -> RelationFetch,
    {
        let (shared, generation, created_at) = match self.claim(key, fetch) {
            Claim::Ready(fetched) => return Ok(fetched),
            Claim::Await { fetch, generation, created_at } => (fetch, generation, created_at),
        };

        let result = shared.await;
        let resolved_at = Utc::now();
        self.settle(key, generation, &result, resolved_at);

        result.map(|value| Fetched { value, created_at, updated_at: resolved_at })
    }

    fn claim<F>(&self, key: &str, fetch: F) -> Claim
    where
        F: FnOnce() -> RelationFetch,
    {
        let now = Utc::now();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(key) {
            match &entry.slot {
                Slot::Pending(shared) => {
                    debug!(relation = key, "joining in-flight relation fetch");
                    return Claim::Await {
                        fetch: shared.clone(),
                        generation: entry.generation,
                        created_at: entry.created_at,
                    };
                }
                Slot::Ready(value) if !self.is_stale(entry, now) => {
                    return Claim::Ready(Fetched {
                        value: value.clone(),
                        created_at: entry.created_at,
                        updated_at: entry.updated_at,
                    });
                }
                Slot::Ready(_) => {}
            }
        }

        let shared = fetch().shared();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        entries.insert(
            key.to_string(),
            CacheEntry {
                slot: Slot::Pending(shared.clone()),
                created_at: now,
                updated_at: now,
                generation,
            },
        );
        Claim::Await { fetch: shared, generation, created_at: now }
    }

    fn settle(
        &self,
        key: &str,
        generation: u64,
        result: &Result<Value, ApiError>,
        resolved_at: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.generation != generation || !matches!(entry.slot, Slot::Pending(_)) {
            return;
        }

        match (result, self.ttl) {
            (Ok(value), Some(_)) => {
                entry.slot = Slot::Ready(value.clone());
                entry.updated_at = resolved_at;
            }
            _ => {
                entries.remove(key);
            }
        }
    }

    fn is_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => (now - entry.updated_at).to_std().is_ok_and(|age| age >= ttl),
            None => true,
        }
    }
}

impl std::fmt::Debug for RelationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ApiClient {
    /// Expand every `$rel` in `value`.
    ///
    /// Failures are logged and leave the affected relation as it was; this
    /// never fails the caller.
    pub async fn enrich(&self, value: Value) -> Value {
        let depth = self.config().relation_depth;
        self.enrich_node(value, None, depth).await
    }

    fn enrich_node(
        &self,
        value: Value,
        parent: Option<Arc<Scope>>,
        depth: usize,
    ) -> BoxFuture<'_, Value> {
        async move {
            if depth == 0 {
                return value;
            }

            match value {
                Value::Object(mut object) => {
                    if let Some(template) = relation_template(&object).map(str::to_string) {
                        let scope = Scope::nested(parent.clone(), Value::Object(object.clone()));
                        self.expand_relation(&mut object, &template, &scope).await;
                    }

                    let scope = Scope::nested(parent, Value::Object(object.clone()));
                    Value::Object(self.enrich_fields(object, scope, depth - 1).await)
                }
                Value::Array(items) => {
                    let children =
                        items.into_iter().map(|item| self.enrich_node(item, parent.clone(), depth - 1));
                    Value::Array(join_all(children).await)
                }
                scalar => scalar,
            }
        }
        .boxed()
    }

    async fn enrich_fields(
        &self,
        object: Map<String, Value>,
        scope: Arc<Scope>,
        depth: usize,
    ) -> Map<String, Value> {
        let (nested, mut flat): (Vec<_>, Vec<_>) = object
            .into_iter()
            .partition(|(_, value)| matches!(value, Value::Object(_) | Value::Array(_)));

        let keys: Vec<String> = nested.iter().map(|(key, _)| key.clone()).collect();
        let children = nested
            .into_iter()
            .map(|(_, value)| self.enrich_node(value, Some(scope.clone()), depth));
        let enriched = join_all(children).await;

        flat.extend(keys.into_iter().zip(enriched));
        flat.into_iter().collect()
    }

    async fn expand_relation(&self, object: &mut Map<String, Value>, template: &str, scope: &Scope) {
        let target = match RelationTarget::resolve(template, scope, &self.config().relation_service)
        {
            Ok(target) => target,
            Err(TemplateError::ForeignService(service)) => {
                debug!(template, service = %service, "relation points at another service");
                return;
            }
            Err(err) => {
                warn!(template, error = %err, "relation template could not be resolved");
                return;
            }
        };

        let key = target.cache_key();
        let client = self.clone();
        let fetched = self
            .relations()
            .resolve(&key, move || async move { client.fetch_relation(target).await }.boxed())
            .await;

        match fetched {
            Ok(fetched) => {
                if !merge_relation(object, fetched.value, fetched.created_at, fetched.updated_at) {
                    debug!(relation = %key, "relation document is not an object");
                }
            }
            Err(err) => {
                warn!(
                    relation = %key,
                    status = err.status(),
                    category = err.label(),
                    error = %err,
                    "relation fetch failed; leaving it unexpanded"
                );
            }
        }
    }

    async fn fetch_relation(&self, target: RelationTarget) -> Result<Value, ApiError> {
        let request = ApiRequest::get(target.endpoint).params(target.params);
        Ok(match self.dispatch(request).await? {
            ApiResponse::Json(value) => value,
            ApiResponse::Binary(_) | ApiResponse::Empty => Value::Null,
        })
    }
}
