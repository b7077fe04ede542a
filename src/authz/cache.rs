//! TTL caches for resolved permissions.
//!
//! Entries are populated lazily on a miss and treated as absent once
//! `now >= expires_at`. Concurrent misses on one key are coalesced: the first
//! caller fetches while later callers wait on a per-key gate and then read the
//! freshly cached value. Failed fetches are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};

use super::clock::Clock;
use super::codec;
use crate::errors::{AppError, AppResult};
use crate::models::permission::ParsedPermission;
use crate::store::{normalize_role, AuthzStore};

/// Default lifetime of a cached entry.
pub const DEFAULT_TTL_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Entries plus the invalidation counters that guard them. Both live under
/// one lock so a write-back and an invalidation cannot interleave.
struct CacheState<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Per-key invalidation count.
    generations: HashMap<K, u64>,
    /// Bumped by `invalidate_all`.
    epoch: u64,
}

impl<K: Eq + Hash, V> CacheState<K, V> {
    fn stamp(&self, key: &K) -> (u64, u64) {
        (self.epoch, self.generations.get(key).copied().unwrap_or(0))
    }
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<CacheState<K, V>>,
    gates: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            state: RwLock::new(CacheState {
                entries: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            }),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let state = self.state.read().ok()?;
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    pub fn insert(&self, key: K, data: V) {
        let expires_at = self.clock.now() + self.ttl;
        if let Ok(mut state) = self.state.write() {
            state.entries.insert(key, CacheEntry { data, expires_at });
        }
    }

    /// Drop `key` and reject any fetch for it that is still in flight.
    pub fn invalidate(&self, key: &K) {
        if let Ok(mut state) = self.state.write() {
            state.entries.remove(key);
            *state.generations.entry(key.clone()).or_insert(0) += 1;
        }
    }

    /// Drop everything and reject every fetch still in flight.
    pub fn invalidate_all(&self) {
        if let Ok(mut state) = self.state.write() {
            state.entries.clear();
            state.generations.clear();
            state.epoch += 1;
        }
    }

    /// Number of entries that have not yet expired.
    pub fn live_len(&self) -> usize {
        let now = self.clock.now();
        self.state
            .read()
            .map(|state| state.entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    /// Return the cached value or run `fetch` once for all concurrent callers
    /// that missed on the same key.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        let gate = self.gate_for(&key);
        let result = {
            let _guard = gate.lock().await;

            if let Some(hit) = self.get(&key) {
                Ok(hit)
            } else {
                let stamp = self.state.read().ok().map(|state| state.stamp(&key));
                let fetched = fetch().await;
                if let Ok(value) = &fetched {
                    self.insert_if_current(key.clone(), value.clone(), stamp);
                }
                fetched
            }
        };

        self.release_gate(&key, &gate);
        result
    }

    /// Store `data` unless `key` was invalidated since `stamp` was taken.
    fn insert_if_current(&self, key: K, data: V, stamp: Option<(u64, u64)>) {
        let expires_at = self.clock.now() + self.ttl;
        if let Ok(mut state) = self.state.write() {
            if stamp == Some(state.stamp(&key)) {
                state.entries.insert(key, CacheEntry { data, expires_at });
            }
        }
    }

    fn gate_for(&self, key: &K) -> Arc<tokio::sync::Mutex<()>> {
        match self.gates.lock() {
            Ok(mut gates) => Arc::clone(gates.entry(key.clone()).or_default()),
            // A poisoned gate map only costs coalescing, not correctness
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn release_gate(&self, key: &K, gate: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut gates) = self.gates.lock() {
            let idle = gates
                .get(key)
                .map(|current| Arc::ptr_eq(current, gate) && Arc::strong_count(gate) <= 2)
                .unwrap_or(false);
            if idle {
                gates.remove(key);
            }
        }
    }
}

/// Parsed permissions per normalised role.
pub struct RolePermissionCache {
    store: Arc<dyn AuthzStore>,
    cache: TtlCache<String, Arc<Vec<ParsedPermission>>>,
}

impl RolePermissionCache {
    pub fn new(store: Arc<dyn AuthzStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Cached permissions for `role`, surfacing store failures.
    pub async fn try_get_for_role(&self, role: &str) -> AppResult<Arc<Vec<ParsedPermission>>> {
        let role = normalize_role(role);
        let store = Arc::clone(&self.store);

        self.cache
            .get_or_try_insert_with(role.clone(), || async move {
                let rows = store.role_permissions(&role).await?;
                let parsed: Vec<ParsedPermission> = rows
                    .iter()
                    .map(|row| codec::parse(&row.permission_key))
                    .collect();
                tracing::debug!(role = %role, count = parsed.len(), "loaded role permissions");
                Ok::<_, AppError>(Arc::new(parsed))
            })
            .await
    }

    /// Cached permissions for `role`; an empty list when the store fails.
    pub async fn get_for_role(&self, role: &str) -> Vec<ParsedPermission> {
        match self.try_get_for_role(role).await {
            Ok(parsed) => parsed.as_ref().clone(),
            Err(err) => {
                tracing::warn!(role = %role, error = %err, "role permission fetch failed; denying");
                Vec::new()
            }
        }
    }

    pub fn invalidate(&self, role: &str) {
        self.cache.invalidate(&normalize_role(role));
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
