use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn, Level};

use floodgate::config::RateLimiterConfig;
use floodgate::entry::IngressEntryPoint;
use floodgate::error::BoxError;
use floodgate::limiter::{
    drop_fn, forward_fn, FixedWindowLimiter, IngressHandler, LeakyBucketLimiter,
    SlidingWindowLimiter, TokenBucketLimiter,
};
use floodgate::sim::{SimRequest, TrafficSimulator, TrafficSimulatorConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    LeakyBucket,
}

/// Demo: run simulated client traffic through an admission-control engine.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Rate limiting algorithm to exercise
    #[arg(long, value_enum, default_value_t = Algorithm::FixedWindow)]
    algorithm: Algorithm,

    /// Maximum requests per window
    #[arg(long, default_value_t = 5)]
    capacity: u32,

    /// Window length in milliseconds
    #[arg(long, default_value_t = 1000)]
    window_ms: u64,

    /// Queue capacity for the leaky bucket algorithm
    #[arg(long)]
    bucket_capacity: Option<u32>,

    /// YAML file overriding the limiter configuration
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let args = Args::parse();

    info!("Starting Floodgate admission-control demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => RateLimiterConfig::from_file(path)?,
        None => {
            let mut config = RateLimiterConfig::new(args.capacity, args.window_ms);
            if let Some(bucket_capacity) = args.bucket_capacity {
                config = config.with_bucket_capacity(bucket_capacity);
            }
            config
        }
    };
    info!(
        algorithm = ?args.algorithm,
        capacity = config.capacity,
        window_ms = config.window_ms,
        "Configuration loaded"
    );

    let forward = forward_fn(|request: SimRequest| async move {
        info!(client = %request.client, payload = %request.payload, "forwarded");
        Ok(())
    });
    let drop = drop_fn(|request: SimRequest, reason: Option<String>| async move {
        warn!(
            client = %request.client,
            reason = reason.as_deref().unwrap_or("unspecified"),
            "dropped"
        );
        Ok(())
    });

    let engine: Arc<dyn IngressHandler<SimRequest>> = match args.algorithm {
        Algorithm::FixedWindow => Arc::new(FixedWindowLimiter::new(config, forward, drop)?),
        Algorithm::SlidingWindow => Arc::new(SlidingWindowLimiter::new(config, forward, drop)?),
        Algorithm::TokenBucket => Arc::new(TokenBucketLimiter::new(config, forward, drop)?),
        Algorithm::LeakyBucket => {
            let config = if config.bucket_capacity.is_none() {
                config.with_bucket_capacity(args.capacity)
            } else {
                config
            };
            Arc::new(LeakyBucketLimiter::new(config, forward, drop)?)
        }
    };

    let entry = Arc::new(IngressEntryPoint::new());
    let validator = |request: &SimRequest| -> Result<(), BoxError> {
        if request.payload.is_empty() {
            Err("payload must not be empty".into())
        } else {
            Ok(())
        }
    };
    entry.use_ingress_handler(engine, Some(Arc::new(validator)));
    info!("Ingress entry point wired");

    // smooth, bursty and slow clients, plus one with a spoofed blank identity
    let mut simulators: Vec<TrafficSimulator> = [
        ("1.2", "smooth", Duration::from_millis(25), 1),
        ("1.3", "burst", Duration::from_millis(50), 10),
        ("1.4", "slow", Duration::from_millis(500), 1),
        ("", "spoof", Duration::from_millis(200), 1),
    ]
    .into_iter()
    .map(|(client, payload, interval, burst_seed_max)| {
        TrafficSimulator::new(
            TrafficSimulatorConfig {
                client: client.into(),
                payload: payload.into(),
                interval,
                burst_seed_max,
            },
            entry.clone() as Arc<dyn IngressHandler<SimRequest>>,
        )
    })
    .collect();

    for sim in &mut simulators {
        sim.start();
    }
    info!(clients = simulators.len(), "Traffic simulation started");

    shutdown_signal().await;

    for sim in &mut simulators {
        sim.stop();
    }
    info!("Floodgate demo stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
