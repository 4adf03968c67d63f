//! Watermark resource cache.
//!
//! Maps an image's ORIGINAL source string to the identifier of its already
//! watermarked resource, so the same source is never rendered twice even
//! when it appears on many elements. Unlike a plain map, the cache is
//! bounded: capacity and an optional time-to-live are configurable, with
//! eviction handled by moka.

use moka::future::Cache;
use std::time::Duration;

/// Sizing and expiry knobs for the watermark cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of source-to-resource entries.
    pub max_entries: u64,
    /// Optional time-to-live for entries. `None` keeps entries until they
    /// are evicted by capacity.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            ttl: None,
        }
    }
}

/// Bounded mapping from original image source to watermarked resource id.
#[derive(Clone)]
pub struct WatermarkCache {
    inner: Cache<String, String>,
}

impl std::fmt::Debug for WatermarkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl WatermarkCache {
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_entries);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
        }
    }

    /// Resource id previously recorded for `source`, if any.
    pub async fn get(&self, source: &str) -> Option<String> {
        self.inner.get(source).await
    }

    /// Record the watermarked resource for an original source.
    pub async fn put(&self, source: &str, resource: &str) {
        self.inner
            .insert(source.to_string(), resource.to_string())
            .await;
    }

    /// Approximate number of live entries. Call [`Self::sync`] first when an
    /// exact count matters.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Flush pending internal maintenance so counts and evictions settle.
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for WatermarkCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
