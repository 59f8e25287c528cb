//! Error types for the Floodgate admission layer.

use thiserror::Error;

/// Type-erased error produced by injected callbacks and validators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for admission-control operations.
///
/// Every `handle()` call either completes silently (successful forward or
/// drop) or raises exactly one of these variants describing the first
/// failure encountered. The core never retries; callers decide.
#[derive(Error, Debug)]
pub enum IngressError {
    /// The entry point was invoked with no engine bound.
    #[error("no ingress handler bound to entry point")]
    Configuration,

    /// An engine was constructed from out-of-range parameters.
    #[error("invalid rate limiter configuration: {0}")]
    InvalidConfig(String),

    /// The injected validator rejected the request before dispatch.
    #[error("request validation failed: {0}")]
    Validation(#[source] BoxError),

    /// The active engine failed while handling a request.
    #[error("request handling failed: {0}")]
    Dispatch(#[source] Box<IngressError>),

    /// The forward callback raised for an admitted request.
    #[error("forward callback failed: {0}")]
    Forward(#[source] BoxError),

    /// The drop callback raised for a refused request.
    #[error("drop callback failed: {0}")]
    Drop(#[source] BoxError),

    /// A drain tick found no record for its client; scheduling bug signal.
    #[error("no rate limit record for client {client}")]
    InternalState { client: String },
}

/// Result type alias for admission-control operations.
pub type Result<T> = std::result::Result<T, IngressError>;
