//! Ingress handler trait and the forward/drop callback plumbing shared by
//! every engine.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::error::{BoxError, IngressError, Result};

/// Drop reason used by every engine for a blank or spoofed identity.
pub const BLANK_IDENTITY_REASON: &str = "client identity blank or invalid";

/// Polymorphic contract implemented by every engine and by the entry point
/// itself.
#[async_trait]
pub trait IngressHandler<T>: Send + Sync {
    /// Decide the fate of a request: exactly one of the forward or drop
    /// callbacks is invoked, and any callback failure propagates as a typed
    /// error.
    async fn handle(&self, request: T) -> Result<()>;
}

/// Invoked when admission succeeds; failures propagate to the caller.
pub type ForwardCallback<T> =
    Arc<dyn Fn(T) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// Invoked when admission is refused, with an optional reason; failures
/// propagate to the caller.
pub type DropCallback<T> = Arc<
    dyn Fn(T, Option<String>) -> BoxFuture<'static, std::result::Result<(), BoxError>>
        + Send
        + Sync,
>;

/// Lift a plain async closure into a [`ForwardCallback`].
pub fn forward_fn<T, F, Fut>(f: F) -> ForwardCallback<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

/// Lift a plain async closure into a [`DropCallback`].
pub fn drop_fn<T, F, Fut>(f: F) -> DropCallback<T>
where
    F: Fn(T, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |request, reason| f(request, reason).boxed())
}

/// Forward an admitted request, classifying callback failure.
pub async fn try_forward<T>(callback: &ForwardCallback<T>, request: T) -> Result<()> {
    callback(request).await.map_err(IngressError::Forward)
}

/// Drop a refused request, classifying callback failure.
pub async fn try_drop<T>(callback: &DropCallback<T>, request: T, reason: &str) -> Result<()> {
    debug!(reason, "dropping request");
    callback(request, Some(reason.to_string()))
        .await
        .map_err(IngressError::Drop)
}
