//! Request and validation capabilities.

use crate::error::BoxError;

/// A request carrying a stable client identity.
///
/// The identity keys all per-client rate limit state. A blank identity is
/// treated as spoofed and is dropped by every engine before any state is
/// touched.
pub trait ClientRequest: Send + Sync + 'static {
    /// The client identity, e.g. a source address.
    fn client_id(&self) -> &str;
}

/// Optional request-shape validation, injected into the entry point.
///
/// Applied before dispatch; a failure rejects the request without reaching
/// any engine. The core never depends on a specific validation library.
pub trait RequestValidator<T>: Send + Sync {
    /// Validate the request shape, returning a diagnostic on failure.
    fn validate(&self, request: &T) -> std::result::Result<(), BoxError>;
}

impl<T, F> RequestValidator<T> for F
where
    F: Fn(&T) -> std::result::Result<(), BoxError> + Send + Sync,
{
    fn validate(&self, request: &T) -> std::result::Result<(), BoxError> {
        self(request)
    }
}
