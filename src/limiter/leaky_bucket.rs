//! Leaky bucket rate limiting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, trace, warn};

use crate::config::RateLimiterConfig;
use crate::error::{IngressError, Result};
use crate::request::ClientRequest;

use super::handler::{
    try_drop, try_forward, DropCallback, ForwardCallback, IngressHandler, BLANK_IDENTITY_REASON,
};

/// Per-client bounded queue and its drain task.
struct BucketState<T> {
    queue: VecDeque<T>,
    drain_task: JoinHandle<()>,
}

/// Outcome of the enqueue decision, resolved before any callback runs.
enum Admission<T> {
    Queued,
    Overflow(T),
}

/// Leaky bucket rate limiting engine.
///
/// Each active client owns a bounded FIFO queue drained at a constant rate
/// of one request every `window / capacity`, decoupling burst absorption
/// from the downstream rate. Unlike the three counting engines, a drained
/// client's state is removed entirely: the drain task ends itself when it
/// observes an empty queue, so idle clients cost nothing.
///
/// All draining for one client happens inside a single task, whose interval
/// fires its first tick immediately. That first tick is the creation-time
/// drain attempt, so it can never race a scheduled tick for the same queue.
pub struct LeakyBucketLimiter<T: ClientRequest> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    bucket_capacity: usize,
    drain_period: Duration,
    clients: DashMap<String, BucketState<T>>,
    forward: ForwardCallback<T>,
    drop: DropCallback<T>,
}

impl<T: ClientRequest> LeakyBucketLimiter<T> {
    /// Create a new leaky bucket engine.
    ///
    /// Requires `bucket_capacity` to be set in the configuration. Must be
    /// called from within a Tokio runtime; drain tasks are spawned per
    /// client as requests arrive.
    pub fn new(
        config: RateLimiterConfig,
        forward: ForwardCallback<T>,
        drop: DropCallback<T>,
    ) -> Result<Self> {
        config.validate()?;
        let bucket_capacity = config.bucket_capacity.ok_or_else(|| {
            IngressError::InvalidConfig(
                "bucket_capacity is required for the leaky bucket engine".into(),
            )
        })? as usize;

        Ok(Self {
            inner: Arc::new(Inner {
                bucket_capacity,
                drain_period: config.drain_period(),
                clients: DashMap::new(),
                forward,
                drop,
            }),
        })
    }

    /// Number of clients with live state.
    pub fn tracked_clients(&self) -> usize {
        self.inner.clients.len()
    }

    /// Queue depth for a client, or `None` if it has no live state.
    pub fn queued_requests(&self, client: &str) -> Option<usize> {
        self.inner.clients.get(client).map(|state| state.queue.len())
    }
}

impl<T: ClientRequest> Drop for LeakyBucketLimiter<T> {
    fn drop(&mut self) {
        for entry in self.inner.clients.iter() {
            entry.value().drain_task.abort();
        }
    }
}

#[async_trait]
impl<T: ClientRequest> IngressHandler<T> for LeakyBucketLimiter<T> {
    async fn handle(&self, request: T) -> Result<()> {
        let client = request.client_id().to_owned();
        if client.is_empty() {
            return try_drop(&self.inner.drop, request, BLANK_IDENTITY_REASON).await;
        }

        let admission = match self.inner.clients.entry(client.clone()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if state.queue.len() >= self.inner.bucket_capacity {
                    Admission::Overflow(request)
                } else {
                    state.queue.push_back(request);
                    Admission::Queued
                }
            }
            Entry::Vacant(vacant) => {
                trace!(client = %client, "starting drain task for new client");
                let mut queue = VecDeque::with_capacity(self.inner.bucket_capacity);
                queue.push_back(request);
                // the entry lock is held until insert() returns, so the
                // task's first lookup cannot observe a missing record
                let drain_task = tokio::spawn(drain_loop(
                    self.inner.clone(),
                    client.clone(),
                    self.inner.drain_period,
                ));
                vacant.insert(BucketState { queue, drain_task });
                Admission::Queued
            }
        };

        match admission {
            Admission::Queued => Ok(()),
            Admission::Overflow(request) => {
                try_drop(&self.inner.drop, request, "bucket overflow").await
            }
        }
    }
}

/// Drain one client's queue until it empties, then remove the entry.
async fn drain_loop<T: ClientRequest>(inner: Arc<Inner<T>>, client: String, period: Duration) {
    let mut ticks = time::interval(period);
    loop {
        // first tick completes immediately: the creation-time drain
        ticks.tick().await;

        let next = match inner.clients.get_mut(&client) {
            Some(mut state) => state.queue.pop_front(),
            None => {
                let err = IngressError::InternalState {
                    client: client.clone(),
                };
                error!(error = %err, "drain tick without client record");
                return;
            }
        };

        match next {
            Some(request) => {
                // a failing downstream must not stall the rest of the queue
                if let Err(err) = try_forward(&inner.forward, request).await {
                    warn!(client = %client, error = %err, "forward failed during drain");
                }
            }
            None => {
                // remove only if still empty: a request may have been queued
                // between the pop and this check
                if inner
                    .clients
                    .remove_if(&client, |_, state| state.queue.is_empty())
                    .is_some()
                {
                    trace!(client = %client, "bucket drained, entry removed");
                    return;
                }
            }
        }
    }
}
