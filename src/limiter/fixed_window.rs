//! Fixed window rate limiting.

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

/// Per-client counter for the current window.
struct WindowStats {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

impl WindowStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            window_start: now,
            count: 0,
            last_seen: now,
        }
    }
}

impl IdleTracked for WindowStats {
    fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Fixed window rate limiting engine.
///
/// Resets each client's quota whenever a request arrives more than one
/// window after the client's window started. Simple and cheap, but prone to
/// bursts straddling a window boundary; see
/// [`SlidingWindowLimiter`](super::SlidingWindowLimiter) for the smoothed
/// variant.
///
/// Boundary semantics: the over-capacity check uses strict `>` against the
/// pre-increment count, so exactly `capacity + 1` requests are admitted per
/// window before the first drop. Kept for compatibility with existing
/// deployments.
pub struct FixedWindowLimiter<T> {
    config: RateLimiterConfig,
    clients: Arc<DashMap<String, WindowStats>>,
    forward: ForwardCallback<T>,
    drop: DropCallback<T>,
    sweeper: JoinHandle<()>,
}

impl<T> FixedWindowLimiter<T> {
    /// Create a new fixed window engine.
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

impl<T> Drop for FixedWindowLimiter<T> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl<T: ClientRequest> IngressHandler<T> for FixedWindowLimiter<T> {
    async fn handle(&self, request: T) -> Result<()> {
        let client = request.client_id().to_owned();
        if client.is_empty() {
            return try_drop(&self.drop, request, BLANK_IDENTITY_REASON).await;
        }

        // Decide and book-keep under the per-client entry lock, then invoke
        // the callback with no lock held.
        let admitted = {
            let mut stats = self
                .clients
                .entry(client.clone())
                .or_insert_with(WindowStats::new);

            let now = Instant::now();
            if now.duration_since(stats.window_start) > self.config.window() {
                trace!(client = %client, "window rolled over");
                stats.count = 0;
                stats.window_start = now;
            }
            stats.last_seen = now;

            if stats.count > self.config.capacity {
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
