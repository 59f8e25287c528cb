//! Sliding window rate limiting.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

use crate::config::RateLimiterConfig;
use crate::error::Result;
use crate::request::ClientRequest;

use super::handler::{
    try_drop, try_forward, DropCallback, ForwardCallback, IngressHandler, BLANK_IDENTITY_REASON,
};
use super::sweep::{spawn_idle_sweeper, IdleTracked};

/// Per-client counters for the current and previous windows.
struct SlidingWindowStats {
    window_start: Instant,
    count: u32,
    previous_count: u32,
    last_seen: Instant,
}

impl SlidingWindowStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            window_start: now,
            count: 0,
            previous_count: 0,
            last_seen: now,
        }
    }
}

impl IdleTracked for SlidingWindowStats {
    fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Sliding window rate limiting engine.
///
/// Smooths the fixed window's boundary burst problem by blending the
/// previous window's count into the load estimate. With `f` the fraction of
/// the current window that has elapsed, the estimate is
/// `floor(previous_count * (1 - f) + count)`: at a fresh boundary the
/// previous window still counts in full, and its weight decays to zero as
/// the window fills. The estimate is recomputed on every request, never
/// cached.
pub struct SlidingWindowLimiter<T> {
    config: RateLimiterConfig,
    clients: Arc<DashMap<String, SlidingWindowStats>>,
    forward: ForwardCallback<T>,
    drop: DropCallback<T>,
    sweeper: JoinHandle<()>,
}

impl<T> SlidingWindowLimiter<T> {
    /// Create a new sliding window engine.
    ///
    /// Must be called from within a Tokio runtime; the engine spawns its
    /// idle-client sweeper here.
    pub fn new(
        config: RateLimiterConfig,
        forward: ForwardCallback<T>,
        drop: DropCallback<T>,
    ) -> Result<Self> {
        config.validate()?;
        let clients = Arc::new(DashMap::new());
        let sweeper = spawn_idle_sweeper(clients.clone(), config.idle_ttl());
        Ok(Self {
            config,
            clients,
            forward,
            drop,
            sweeper,
        })
    }

    /// Number of clients with live state.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

impl<T> Drop for SlidingWindowLimiter<T> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl<T: ClientRequest> IngressHandler<T> for SlidingWindowLimiter<T> {
    async fn handle(&self, request: T) -> Result<()> {
        let client = request.client_id().to_owned();
        if client.is_empty() {
            return try_drop(&self.drop, request, BLANK_IDENTITY_REASON).await;
        }

        let window = self.config.window();
        let admitted = {
            let mut stats = self
                .clients
                .entry(client.clone())
                .or_insert_with(SlidingWindowStats::new);

            let now = Instant::now();
            if now.duration_since(stats.window_start) > window {
                trace!(client = %client, count = stats.count, "window rolled over");
                stats.previous_count = stats.count;
                stats.count = 0;
                stats.window_start = now;
            }
            stats.last_seen = now;

            let elapsed = now.duration_since(stats.window_start);
            let overlap = elapsed.as_secs_f64() / window.as_secs_f64();
            let estimate =
                (stats.previous_count as f64 * (1.0 - overlap) + stats.count as f64).floor() as u32;

            if estimate > self.config.capacity {
                false
            } else {
                stats.count += 1;
                true
            }
        };

        if admitted {
            try_forward(&self.forward, request).await
        } else {
            try_drop(&self.drop, request, "rate exceeded").await
        }
    }
}
