//! Traffic simulation for demos and tests.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::warn;

use crate::limiter::IngressHandler;
use crate::request::ClientRequest;

/// A simulated ingress request.
#[derive(Debug, Clone)]
pub struct SimRequest {
    /// Client identity, e.g. a source address. Blank means spoofed.
    pub client: String,
    /// Opaque payload content.
    pub payload: String,
}

impl SimRequest {
    pub fn new(client: &str, payload: &str) -> Self {
        Self {
            client: client.to_string(),
            payload: payload.to_string(),
        }
    }
}

impl ClientRequest for SimRequest {
    fn client_id(&self) -> &str {
        &self.client
    }
}

/// Parameters for one simulated client.
#[derive(Debug, Clone)]
pub struct TrafficSimulatorConfig {
    /// Identity stamped on every generated request.
    pub client: String,
    /// Payload stamped on every generated request.
    pub payload: String,
    /// Cadence between bursts.
    pub interval: Duration,
    /// Upper bound for the random burst size; zero or one means a steady
    /// single request per interval.
    pub burst_seed_max: u32,
}

/// Drives a stream of requests from one simulated client into a handler.
pub struct TrafficSimulator {
    task: Option<JoinHandle<()>>,
    config: TrafficSimulatorConfig,
    handler: Arc<dyn IngressHandler<SimRequest>>,
}

impl TrafficSimulator {
    pub fn new(config: TrafficSimulatorConfig, handler: Arc<dyn IngressHandler<SimRequest>>) -> Self {
        Self {
            task: None,
            config,
            handler,
        }
    }

    /// Start sending traffic. Restarting an already running simulator stops
    /// the previous run first.
    pub fn start(&mut self) {
        self.stop();

        let config = self.config.clone();
        let handler = self.handler.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticks = time::interval(config.interval);
            loop {
                ticks.tick().await;

                // pick a burst size between 1 and a random seed, so bursts
                // cluster small but occasionally spike
                let burst = {
                    let mut rng = rand::thread_rng();
                    let seed = rng.gen_range(1..=config.burst_seed_max.max(1));
                    rng.gen_range(1..=seed)
                };

                for _ in 0..burst {
                    let request = SimRequest::new(&config.client, &config.payload);
                    if let Err(err) = handler.handle(request).await {
                        warn!(client = %config.client, error = %err, "simulated request failed");
                    }
                }
            }
        }));
    }

    /// Stop sending traffic.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TrafficSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
