//! Rate limiter configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{IngressError, Result};

/// Idle TTL defaults to this many windows when not set explicitly.
const DEFAULT_IDLE_WINDOWS: u64 = 10;

/// Immutable parameters for a rate-limiting engine.
///
/// Constructed by the caller when building an engine and validated at
/// engine construction time. `bucket_capacity` is only meaningful for the
/// leaky bucket engine, which refuses to build without it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Time window for measuring capacity, in milliseconds.
    pub window_ms: u64,

    /// Maximum requests per window.
    pub capacity: u32,

    /// Queue capacity for the leaky bucket engine.
    #[serde(default)]
    pub bucket_capacity: Option<u32>,

    /// How long an idle client's state is retained, in milliseconds.
    ///
    /// Defaults to ten windows. Applies to the fixed window, sliding window
    /// and token bucket engines; leaky bucket entries garbage-collect
    /// themselves when their queue drains.
    #[serde(default)]
    pub idle_ttl_ms: Option<u64>,
}

impl RateLimiterConfig {
    /// Create a configuration with the given capacity and window.
    pub fn new(capacity: u32, window_ms: u64) -> Self {
        Self {
            window_ms,
            capacity,
            bucket_capacity: None,
            idle_ttl_ms: None,
        }
    }

    /// Set the leaky bucket queue capacity.
    pub fn with_bucket_capacity(mut self, bucket_capacity: u32) -> Self {
        self.bucket_capacity = Some(bucket_capacity);
        self
    }

    /// Override the idle-client TTL.
    pub fn with_idle_ttl_ms(mut self, idle_ttl_ms: u64) -> Self {
        self.idle_ttl_ms = Some(idle_ttl_ms);
        self
    }

    /// Load a configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| IngressError::InvalidConfig(e.to_string()))?;
        let config: RateLimiterConfig = serde_yaml::from_str(&contents)
            .map_err(|e| IngressError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the parameters an engine is about to be built from.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(IngressError::InvalidConfig(
                "window_ms must be greater than zero".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(IngressError::InvalidConfig(
                "capacity must be greater than zero".into(),
            ));
        }
        if self.bucket_capacity == Some(0) {
            return Err(IngressError::InvalidConfig(
                "bucket_capacity must be greater than zero".into(),
            ));
        }
        if self.idle_ttl_ms == Some(0) {
            return Err(IngressError::InvalidConfig(
                "idle_ttl_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The measurement window as a `Duration`.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Interval between leaky bucket drain ticks: one dequeue every
    /// `window / capacity`, floored at one millisecond.
    pub fn drain_period(&self) -> Duration {
        Duration::from_millis((self.window_ms / self.capacity.max(1) as u64).max(1))
    }

    /// Idle-client TTL, explicit or derived from the window length.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_millis(
            self.idle_ttl_ms
                .unwrap_or_else(|| self.window_ms.saturating_mul(DEFAULT_IDLE_WINDOWS)),
        )
    }
}
