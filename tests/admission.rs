//! End-to-end admission properties across algorithms and the entry point.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time;

use floodgate::config::RateLimiterConfig;
use floodgate::entry::IngressEntryPoint;
use floodgate::error::BoxError;
use floodgate::limiter::{
    drop_fn, forward_fn, DropCallback, FixedWindowLimiter, ForwardCallback, IngressHandler,
    LeakyBucketLimiter, SlidingWindowLimiter, TokenBucketLimiter,
};
use floodgate::sim::SimRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Forwarded,
    Dropped,
}

type Log = Arc<Mutex<Vec<Decision>>>;

fn decision_callbacks() -> (ForwardCallback<SimRequest>, DropCallback<SimRequest>, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let f = log.clone();
    let d = log.clone();
    (
        forward_fn(move |_request: SimRequest| {
            let f = f.clone();
            async move {
                f.lock().push(Decision::Forwarded);
                Ok(())
            }
        }),
        drop_fn(move |_request: SimRequest, _reason| {
            let d = d.clone();
            async move {
                d.lock().push(Decision::Dropped);
                Ok(())
            }
        }),
        log,
    )
}

fn engines_under_test() -> Vec<(&'static str, Arc<dyn IngressHandler<SimRequest>>, Log)> {
    let mut engines: Vec<(&'static str, Arc<dyn IngressHandler<SimRequest>>, Log)> = Vec::new();

    let (forward, drop, log) = decision_callbacks();
    engines.push((
        "fixed window",
        Arc::new(FixedWindowLimiter::new(RateLimiterConfig::new(5, 1000), forward, drop).unwrap()),
        log,
    ));

    let (forward, drop, log) = decision_callbacks();
    engines.push((
        "sliding window",
        Arc::new(
            SlidingWindowLimiter::new(RateLimiterConfig::new(5, 1000), forward, drop).unwrap(),
        ),
        log,
    ));

    let (forward, drop, log) = decision_callbacks();
    engines.push((
        "token bucket",
        Arc::new(TokenBucketLimiter::new(RateLimiterConfig::new(5, 1000), forward, drop).unwrap()),
        log,
    ));

    let (forward, drop, log) = decision_callbacks();
    engines.push((
        "leaky bucket",
        Arc::new(
            LeakyBucketLimiter::new(
                RateLimiterConfig::new(5, 1000).with_bucket_capacity(5),
                forward,
                drop,
            )
            .unwrap(),
        ),
        log,
    ));

    engines
}

#[tokio::test]
async fn blank_identity_drops_for_every_algorithm() {
    for (name, engine, log) in engines_under_test() {
        engine.handle(SimRequest::new("", "spoof")).await.unwrap();
        assert_eq!(
            log.lock().as_slice(),
            &[Decision::Dropped],
            "{name} must drop a blank identity"
        );
    }
}

#[tokio::test]
async fn identical_engines_make_identical_decisions() {
    // same config, same request sequence, same decisions
    let run = |config: RateLimiterConfig| async move {
        let (forward, drop, log) = decision_callbacks();
        let limiter = FixedWindowLimiter::new(config, forward, drop).unwrap();
        for i in 0..20 {
            let client = if i % 4 == 0 { "5.6.7.8" } else { "1.2.3.4" };
            limiter.handle(SimRequest::new(client, "x")).await.unwrap();
        }
        let decisions = log.lock().clone();
        decisions
    };

    let first = run(RateLimiterConfig::new(3, 1000)).await;
    let second = run(RateLimiterConfig::new(3, 1000)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn entry_point_forwards_exactly_when_engine_would() {
    let sequence: Vec<SimRequest> = (0..10)
        .map(|i| SimRequest::new("1.2.3.4", &format!("r{i}")))
        .collect();

    // engine in isolation
    let (forward, drop, bare_log) = decision_callbacks();
    let bare = TokenBucketLimiter::new(RateLimiterConfig::new(5, 1000), forward, drop).unwrap();
    for request in sequence.clone() {
        bare.handle(request).await.unwrap();
    }

    // identical engine behind the entry point with a passing validator
    let (forward, drop, wired_log) = decision_callbacks();
    let engine = TokenBucketLimiter::new(RateLimiterConfig::new(5, 1000), forward, drop).unwrap();
    let entry = IngressEntryPoint::new();
    let validator =
        |_request: &SimRequest| -> Result<(), BoxError> { Ok(()) };
    entry.use_ingress_handler(Arc::new(engine), Some(Arc::new(validator)));
    for request in sequence {
        entry.handle(request).await.unwrap();
    }

    assert_eq!(bare_log.lock().clone(), wired_log.lock().clone());
}

#[tokio::test(start_paused = true)]
async fn fixed_window_admits_again_after_rollover() {
    let (forward, drop, log) = decision_callbacks();
    let limiter =
        FixedWindowLimiter::new(RateLimiterConfig::new(2, 1000), forward, drop).unwrap();

    for _ in 0..4 {
        limiter.handle(SimRequest::new("1.2.3.4", "x")).await.unwrap();
    }
    assert_eq!(
        log.lock().as_slice(),
        &[
            Decision::Forwarded,
            Decision::Forwarded,
            Decision::Forwarded,
            Decision::Dropped
        ]
    );

    time::advance(Duration::from_millis(1001)).await;
    limiter.handle(SimRequest::new("1.2.3.4", "x")).await.unwrap();
    assert_eq!(*log.lock().last().unwrap(), Decision::Forwarded);
}

#[tokio::test(start_paused = true)]
async fn leaky_bucket_burst_drains_through_entry_point() {
    let (forward, drop, log) = decision_callbacks();
    let engine = LeakyBucketLimiter::new(
        RateLimiterConfig::new(3, 300).with_bucket_capacity(3),
        forward,
        drop,
    )
    .unwrap();
    let engine = Arc::new(engine);

    let entry = IngressEntryPoint::new();
    entry.use_ingress_handler(
        engine.clone() as Arc<dyn IngressHandler<SimRequest>>,
        None,
    );

    // 4 back-to-back: 3 queued, 4th overflows
    for i in 0..4 {
        entry
            .handle(SimRequest::new("1.2.3.4", &format!("r{i}")))
            .await
            .unwrap();
    }
    assert_eq!(log.lock().as_slice(), &[Decision::Dropped]);

    // drains at 100ms per request, then the entry is garbage-collected
    time::sleep(Duration::from_millis(350)).await;
    assert_eq!(
        log.lock().as_slice(),
        &[
            Decision::Dropped,
            Decision::Forwarded,
            Decision::Forwarded,
            Decision::Forwarded
        ]
    );
    assert_eq!(engine.tracked_clients(), 0);
}
