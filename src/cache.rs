// src/cache.rs
//! In-process lookup caches owned by a chain client.
//!
//! Entries never expire; they live as long as the owning client or until
//! [`CacheLayer::clear_all`]. Confirmed negative lookups are stored too (as
//! `None` values); failed lookups are not, so they are retried next time.

use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::hash::Hash;

/// Builds a composite cache key (`prefix:a:b`).
pub fn generate_key(prefix: &str, params: &[&str]) -> String {
    let mut key = prefix.to_string();
    for param in params {
        key.push(':');
        key.push_str(param);
    }
    key
}

/// One concurrency-safe, unbounded key → value map.
pub struct CacheMap<K, V> {
    name: &'static str,
    entries: DashMap<K, V>,
}

impl<K, V> CacheMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `value` unless another writer got there first; returns whatever
    /// ends up stored so racing callers all observe the same value.
    pub fn insert(&self, key: K, value: V) -> V {
        self.entries.entry(key).or_insert(value).value().clone()
    }

    /// Miss-then-populate lookup. The map is not locked while `fetch` runs,
    /// so concurrent misses may all fetch, but only the first result is kept.
    /// A failed fetch leaves the key absent.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(&key) {
            debug!("{} cache HIT for key: {:?}", self.name, key);
            return Ok(hit);
        }
        debug!("{} cache MISS for key: {:?}", self.name, key);
        let fetched = fetch().await?;
        Ok(self.insert(key, fetched))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> fmt::Debug for CacheMap<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheMap")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Name/symbol read from a token's metadata account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub owners: usize,
    pub token_metadata: usize,
    pub token_accounts: usize,
    pub slot_times: usize,
}

/// The four lookup caches of a ledger-model chain client.
#[derive(Debug)]
pub struct CacheLayer {
    /// token account → owning wallet (`None` = account has no parsed owner)
    pub owners: CacheMap<String, Option<String>>,
    /// mint → metadata (`None` = no metadata account found)
    pub token_metadata: CacheMap<String, Option<TokenMetadata>>,
    /// `wallet:mint` → token account addresses
    pub token_accounts: CacheMap<String, Vec<String>>,
    /// slot → block time in unix seconds (`None` = slot skipped/unavailable)
    pub slot_times: CacheMap<u64, Option<i64>>,
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheLayer {
    pub fn new() -> Self {
        Self {
            owners: CacheMap::new("owner"),
            token_metadata: CacheMap::new("token_metadata"),
            token_accounts: CacheMap::new("token_accounts"),
            slot_times: CacheMap::new("slot_time"),
        }
    }

    pub fn clear_all(&self) {
        self.owners.clear();
        self.token_metadata.clear();
        self.token_accounts.clear();
        self.slot_times.clear();
        debug!("All caches cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            owners: self.owners.len(),
            token_metadata: self.token_metadata.len(),
            token_accounts: self.token_accounts.len(),
            slot_times: self.slot_times.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_generate_key() {
        assert_eq!(generate_key("accounts", &["wallet", "mint"]), "accounts:wallet:mint");
        assert_eq!(generate_key("owner", &[]), "owner");
    }

    #[tokio::test]
    async fn test_get_or_fetch_populates_once() {
        let cache: CacheMap<String, Option<String>> = CacheMap::new("owner");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch("acct".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(Some("wallet".to_string()))
                })
                .await;
            assert_eq!(value, Ok(Some("wallet".to_string())));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_results_are_cached() {
        let cache: CacheMap<u64, Option<i64>> = CacheMap::new("slot_time");
        let calls = AtomicUsize::new(0);
        for _ in 0..2 {
            let value = cache
                .get_or_fetch(7, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(None)
                })
                .await;
            assert_eq!(value, Ok(None));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_retried() {
        let cache: CacheMap<u64, Option<i64>> = CacheMap::new("slot_time");
        let first = cache.get_or_fetch(7, || async { Err("HTTP 503") }).await;
        assert_eq!(first, Err("HTTP 503"));
        assert!(cache.is_empty());

        let second = cache.get_or_fetch(7, || async { Ok::<_, &str>(Some(1_700_000_000)) }).await;
        assert_eq!(second, Ok(Some(1_700_000_000)));
        assert_eq!(cache.get(&7), Some(Some(1_700_000_000)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_miss_then_populate_converges() {
        let layer = Arc::new(CacheLayer::new());
        let mut handles = Vec::new();

        for i in 0..32u64 {
            let layer = layer.clone();
            handles.push(tokio::spawn(async move {
                layer
                    .slot_times
                    .get_or_fetch(99, || async move {
                        tokio::task::yield_now().await;
                        Ok::<_, ()>(Some(i as i64))
                    })
                    .await
            }));
        }

        let mut observed = Vec::new();
        for handle in handles {
            observed.push(handle.await.unwrap().unwrap());
        }

        let stored = layer.slot_times.get(&99).unwrap();
        assert!(observed.iter().all(|v| *v == stored));
        assert_eq!(layer.slot_times.len(), 1);
    }

    #[test]
    fn test_stats_and_clear() {
        let layer = CacheLayer::new();
        layer.owners.insert("a".into(), Some("w".into()));
        layer.owners.insert("b".into(), None);
        layer.token_accounts.insert(generate_key("w", &["m"]), vec!["a".into()]);
        layer.token_metadata.insert("m".into(), Some(TokenMetadata::default()));

        assert_eq!(
            layer.stats(),
            CacheStats { owners: 2, token_metadata: 1, token_accounts: 1, slot_times: 0 }
        );
        layer.clear_all();
        assert_eq!(layer.stats(), CacheStats::default());
    }

    #[test]
    fn test_first_writer_wins() {
        let cache: CacheMap<String, Option<String>> = CacheMap::new("owner");
        assert_eq!(cache.insert("k".into(), Some("first".into())).as_deref(), Some("first"));
        assert_eq!(cache.insert("k".into(), Some("second".into())).as_deref(), Some("first"));
    }
}
