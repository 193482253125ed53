//! Request cache - memoizes raw provider responses with a per-provider TTL
//!
//! Bounds the outbound request rate. Failed fetches are never stored, and at
//! most one fetch per key is outstanding at a time.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::clock::Clock;
use crate::oracle::ProviderError;

/// Cached raw provider payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    /// Epoch millis of the fetch that produced this payload
    pub fetched_at: i64,
}

pub struct RequestCache {
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// Per-key gates so concurrent misses share one outbound fetch
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RequestCache {
    /// Create a cache with its own HTTP client bounded by `timeout`
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("liquidity-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self::with_client(client, clock))
    }

    pub fn with_client(client: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// GET `url` as JSON, serving from cache while the entry under `key` is
    /// younger than `ttl`
    pub async fn get_or_fetch(
        &self,
        provider: &'static str,
        url: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Value, ProviderError> {
        let client = self.client.clone();
        let url = url.to_string();
        self.get_or_fetch_with(key, ttl, move || async move {
            fetch_json(&client, provider, &url).await
        })
        .await
    }

    /// Same as [`get_or_fetch`](Self::get_or_fetch) with a caller-supplied fetch
    pub async fn get_or_fetch_with<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Value, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ProviderError>>,
    {
        if let Some(payload) = self.fresh(key, ttl).await {
            debug!(key = %key, "cache hit");
            return Ok(payload);
        }

        let gate = self.gate(key).await;
        let _guard = gate.lock().await;

        // Another caller may have refreshed the entry while we waited.
        if let Some(payload) = self.fresh(key, ttl).await {
            debug!(key = %key, "cache hit after wait");
            return Ok(payload);
        }

        debug!(key = %key, "cache miss");
        let payload = fetch().await?;

        let entry = CacheEntry {
            payload: payload.clone(),
            fetched_at: self.clock.now_millis(),
        };
        self.entries.write().await.insert(key.to_string(), entry);

        Ok(payload)
    }

    /// Whether `key` holds an entry younger than `ttl`
    pub async fn is_fresh(&self, key: &str, ttl: Duration) -> bool {
        self.fresh(key, ttl).await.is_some()
    }

    /// Number of cached keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn fresh(&self, key: &str, ttl: Duration) -> Option<Value> {
        let now = self.clock.now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| now - entry.fetched_at < ttl_ms)
            .map(|entry| entry.payload.clone())
    }

    async fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

async fn fetch_json(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
) -> Result<Value, ProviderError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|source| ProviderError::Decode { provider, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with_clock() -> (RequestCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = RequestCache::with_client(reqwest::Client::new(), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn serves_fresh_entry_without_refetching() {
        let (cache, clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let ttl = Duration::from_secs(5);

        for _ in 0..3 {
            let payload = cache
                .get_or_fetch_with("coinbase:BTC-USD", ttl, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({ "price": "100" }))
                })
                .await
                .unwrap();
            assert_eq!(payload["price"], "100");
            clock.advance(1_000);
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refetches_once_ttl_elapses() {
        let (cache, clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let ttl = Duration::from_millis(5_000);

        let fetch = move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "n": n }))
        };

        let first = cache.get_or_fetch_with("k", ttl, fetch).await.unwrap();
        clock.advance(4_999);
        assert!(cache.is_fresh("k", ttl).await);

        clock.advance(1);
        assert!(!cache.is_fresh("k", ttl).await);
        let second = cache.get_or_fetch_with("k", ttl, fetch).await.unwrap();

        assert_eq!(first["n"], 0);
        assert_eq!(second["n"], 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let (cache, _clock) = cache_with_clock();
        let ttl = Duration::from_secs(60);

        let failed = cache
            .get_or_fetch_with("k", ttl, || async {
                Err(ProviderError::Status {
                    provider: "test",
                    status: 503,
                })
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty().await);

        let ok = cache
            .get_or_fetch_with("k", ttl, || async { Ok(json!(1)) })
            .await
            .unwrap();
        assert_eq!(ok, json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let (cache, _clock) = cache_with_clock();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let ttl = Duration::from_secs(5);

        let fetch = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(json!("payload"))
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch_with("k", ttl, fetch),
            cache.get_or_fetch_with("k", ttl, fetch),
        );

        assert_eq!(a.unwrap(), json!("payload"));
        assert_eq!(b.unwrap(), json!("payload"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
