//! Token bucket rate limiting.

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

/// Per-client token quota for the current window.
struct TokenBucketStats {
    window_start: Instant,
    tokens: u32,
    last_seen: Instant,
}

impl TokenBucketStats {
    fn new(capacity: u32) -> Self {
        let now = Instant::now();
        Self {
            window_start: now,
            tokens: capacity,
            last_seen: now,
        }
    }
}

impl IdleTracked for TokenBucketStats {
    fn last_seen(&self) -> Instant {
        self.last_seen
    }
}

/// Token bucket rate limiting engine.
///
/// A per-window quota model, not a continuously refilling bucket: each
/// client starts a window with `capacity` tokens, every admitted request
/// consumes one, and the bucket refills to full only at the window boundary.
/// Exhausted clients are rejected immediately until rollover; nothing is
/// queued. Contrast with [`LeakyBucketLimiter`](super::LeakyBucketLimiter),
/// which queues bursts and drains them at a constant rate.
pub struct TokenBucketLimiter<T> {
    config: RateLimiterConfig,
    clients: Arc<DashMap<String, TokenBucketStats>>,
    forward: ForwardCallback<T>,
    drop: DropCallback<T>,
    sweeper: JoinHandle<()>,
}

impl<T> TokenBucketLimiter<T> {
    /// Create a new token bucket engine.
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

impl<T> Drop for TokenBucketLimiter<T> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl<T: ClientRequest> IngressHandler<T> for TokenBucketLimiter<T> {
    async fn handle(&self, request: T) -> Result<()> {
        let client = request.client_id().to_owned();
        if client.is_empty() {
            return try_drop(&self.drop, request, BLANK_IDENTITY_REASON).await;
        }

        let capacity = self.config.capacity;
        let admitted = {
            let mut stats = self
                .clients
                .entry(client.clone())
                .or_insert_with(|| TokenBucketStats::new(capacity));

            let now = Instant::now();
            if now.duration_since(stats.window_start) > self.config.window() {
                trace!(client = %client, "token bucket refilled");
                stats.tokens = capacity;
                stats.window_start = now;
            }
            stats.last_seen = now;

            if stats.tokens == 0 {
                false
            } else {
                stats.tokens -= 1;
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
