//! # Reachability Probing
//!
//! A small capability interface for "can this device reach that resource
//! right now" questions, plus a shared TTL'd cache so repeated checks of the
//! same target don't repeatedly pay probe latency.
//!
//! The cache is one helper composed into whatever needs it — the connection
//! manager's address probes and the cached access probe both hold one — so
//! no type hierarchy is involved.

use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Local resource reachability checks.
#[async_trait]
pub trait AccessProbe: Send + Sync {
    async fn can_access_file(&self, path: &str) -> bool;

    async fn can_access_directory(&self, path: &str) -> bool;

    async fn can_access_url(&self, url: &str) -> bool;
}

/// TTL'd LRU cache of reachability verdicts keyed by target.
pub struct ReachabilityCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    reachable: bool,
    checked_at: Instant,
}

impl ReachabilityCache {
    /// `capacity` bounds the number of remembered targets; `ttl` bounds how
    /// long a verdict is trusted.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// A still-fresh verdict for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<bool> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get(key)?;
        if entry.checked_at.elapsed() > self.ttl {
            entries.pop(key);
            return None;
        }
        Some(entry.reachable)
    }

    pub async fn put(&self, key: &str, reachable: bool) {
        self.entries.lock().await.put(
            key.to_string(),
            CacheEntry {
                reachable,
                checked_at: Instant::now(),
            },
        );
    }

    /// Forget a verdict, forcing the next check to probe again.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.pop(key);
    }
}

/// Filesystem-backed access probe.
///
/// URL probing deliberately answers `false`: deciding whether a remote
/// endpoint is reachable belongs to the connection manager, which owns the
/// timeout and fallback policy for that.
pub struct FsAccessProbe;

#[async_trait]
impl AccessProbe for FsAccessProbe {
    async fn can_access_file(&self, path: &str) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.is_file(),
            Err(_) => false,
        }
    }

    async fn can_access_directory(&self, path: &str) -> bool {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.is_dir(),
            Err(_) => false,
        }
    }

    async fn can_access_url(&self, _url: &str) -> bool {
        false
    }
}

/// Wraps any [`AccessProbe`] with a [`ReachabilityCache`].
pub struct CachedAccessProbe {
    inner: Arc<dyn AccessProbe>,
    cache: ReachabilityCache,
}

impl CachedAccessProbe {
    pub fn new(inner: Arc<dyn AccessProbe>, cache: ReachabilityCache) -> Self {
        Self { inner, cache }
    }

    async fn check(&self, key: String, probe: impl std::future::Future<Output = bool>) -> bool {
        if let Some(cached) = self.cache.get(&key).await {
            debug!(key = %key, cached, "Reachability cache hit");
            return cached;
        }
        let reachable = probe.await;
        self.cache.put(&key, reachable).await;
        reachable
    }
}

#[async_trait]
impl AccessProbe for CachedAccessProbe {
    async fn can_access_file(&self, path: &str) -> bool {
        self.check(format!("file:{}", path), self.inner.can_access_file(path))
            .await
    }

    async fn can_access_directory(&self, path: &str) -> bool {
        self.check(format!("dir:{}", path), self.inner.can_access_directory(path))
            .await
    }

    async fn can_access_url(&self, url: &str) -> bool {
        self.check(format!("url:{}", url), self.inner.can_access_url(url))
            .await
    }
}
