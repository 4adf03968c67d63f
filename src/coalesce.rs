//! Render coalescing.
//!
//! Deduplicates concurrent watermark renders for the same source. When
//! several elements sharing one source miss the cache at the same time:
//! - the first caller (leader) decodes, renders and populates the cache,
//!   then signals completion
//! - later callers (followers) wait for the leader, then re-read the cache
//!
//! This turns the check-then-render race into a single render per source.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Tracks in-flight renders and coalesces concurrent requests per source.
#[derive(Debug, Clone)]
pub struct RenderCoalescer {
    /// Map of in-flight sources to completion signals. A leader sends on
    /// its channel when the cache has been populated (or the attempt gave
    /// up), waking every follower.
    in_flight: Arc<tokio::sync::Mutex<HashMap<String, watch::Sender<bool>>>>,
}

impl RenderCoalescer {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Acquire a slot for rendering `source`.
    ///
    /// Returns [`RenderSlot::Leader`] if no render for this source is in
    /// flight; the caller should render, populate the cache, then complete
    /// (or drop) the guard. Returns [`RenderSlot::Follower`] after an
    /// in-flight leader finished; the caller should re-read the cache.
    pub async fn acquire(&self, source: &str) -> RenderSlot {
        let receiver = {
            let in_flight = self.in_flight.lock().await;
            in_flight.get(source).map(|sender| sender.subscribe())
        };

        if let Some(mut rx) = receiver {
            // A render is in flight; wait for the leader's completion signal
            let _ = rx.wait_for(|&completed| completed).await;
            RenderSlot::Follower
        } else {
            let (tx, _rx) = watch::channel(false);

            {
                let mut in_flight = self.in_flight.lock().await;
                // Double-check: another task may have become leader while
                // the lock was released
                if in_flight.contains_key(source) {
                    drop(in_flight);
                    return Box::pin(self.acquire(source)).await;
                }
                in_flight.insert(source.to_string(), tx.clone());
            }

            RenderSlot::Leader(LeaderGuard {
                source: source.to_string(),
                coalescer: self.clone(),
                sender: tx,
            })
        }
    }

    /// Number of sources currently being rendered.
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    async fn remove_in_flight(&self, source: &str) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.remove(source);
    }
}

impl Default for RenderCoalescer {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of acquiring a render slot.
#[derive(Debug)]
pub enum RenderSlot {
    /// First request for this source. Render, cache, then complete the
    /// guard; dropping it also notifies waiting followers.
    Leader(LeaderGuard),

    /// A concurrent render finished; the result should be in the cache.
    Follower,
}

impl RenderSlot {
    pub fn is_leader(&self) -> bool {
        matches!(self, RenderSlot::Leader(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, RenderSlot::Follower)
    }
}

/// Guard held by the leading render. Notifies followers on completion.
#[derive(Debug)]
pub struct LeaderGuard {
    source: String,
    coalescer: RenderCoalescer,
    sender: watch::Sender<bool>,
}

impl LeaderGuard {
    /// Mark the render complete and wake all followers. Dropping the guard
    /// has the same effect; this form cleans up without a spawned task.
    pub async fn complete(self) {
        let _ = self.sender.send(true);
        self.coalescer.remove_in_flight(&self.source).await;
        // Cleanup already done, skip the Drop path
        std::mem::forget(self);
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        let _ = self.sender.send(true);

        // Drop is not async, so the in-flight entry is cleaned up from a task
        let coalescer = self.coalescer.clone();
        let source = self.source.clone();
        tokio::spawn(async move {
            coalescer.remove_in_flight(&source).await;
        });
    }
}
