//! Idle-client eviction.
//!
//! The fixed window, sliding window and token bucket engines never remove
//! state on their own, so each spawns one of these sweepers at construction
//! time. Records idle past the TTL are removed wholesale; a returning client
//! simply gets a fresh record, which is indistinguishable from a rolled-over
//! one.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// State records that track when their client was last seen.
pub(crate) trait IdleTracked: Send + Sync + 'static {
    fn last_seen(&self) -> Instant;
}

/// Spawn a background task that evicts entries idle past `ttl`.
///
/// The sweep wakes once per TTL, so an idle entry survives at most two TTLs.
/// The returned handle must be aborted when the owning engine is dropped.
pub(crate) fn spawn_idle_sweeper<S: IdleTracked>(
    clients: Arc<DashMap<String, S>>,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = time::interval(ttl);
        // the immediate first tick would sweep an empty map
        ticks.tick().await;

        loop {
            ticks.tick().await;
            let now = Instant::now();
            let before = clients.len();
            clients.retain(|_, state| now.duration_since(state.last_seen()) <= ttl);
            let evicted = before - clients.len();
            if evicted > 0 {
                debug!(evicted, remaining = clients.len(), "evicted idle clients");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stamp(Instant);

    impl IdleTracked for Stamp {
        fn last_seen(&self) -> Instant {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_entries() {
        let clients: Arc<DashMap<String, Stamp>> = Arc::new(DashMap::new());
        clients.insert("1.2.3.4".into(), Stamp(Instant::now()));

        let ttl = Duration::from_secs(1);
        let sweeper = spawn_idle_sweeper(clients.clone(), ttl);
        // let the sweeper task start and register its interval timer
        tokio::task::yield_now().await;

        time::advance(ttl * 3).await;
        tokio::task::yield_now().await;

        assert_eq!(clients.len(), 0);
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_fresh_entries() {
        let clients: Arc<DashMap<String, Stamp>> = Arc::new(DashMap::new());

        let ttl = Duration::from_secs(1);
        let sweeper = spawn_idle_sweeper(clients.clone(), ttl);

        time::advance(ttl / 2).await;
        clients.insert("1.2.3.4".into(), Stamp(Instant::now()));
        time::advance(ttl / 2).await;
        tokio::task::yield_now().await;

        assert_eq!(clients.len(), 1);
        sweeper.abort();
    }
}
