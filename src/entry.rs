//! Ingress entry point.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{IngressError, Result};
use crate::limiter::IngressHandler;
use crate::request::RequestValidator;

/// The engine and validator active for dispatch.
struct Binding<T> {
    handler: Arc<dyn IngressHandler<T>>,
    validator: Option<Arc<dyn RequestValidator<T>>>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            validator: self.validator.clone(),
        }
    }
}

/// Single public entry for ingress traffic.
///
/// Holds a pluggable rate-limiting engine and an optional request validator,
/// and implements [`IngressHandler`] itself so it can be composed like any
/// engine. The engine can be swapped at any time, including while requests
/// are in flight: a call in progress keeps the binding it observed at start,
/// later calls use the replacement.
pub struct IngressEntryPoint<T> {
    binding: RwLock<Option<Binding<T>>>,
}

impl<T: Send + 'static> IngressEntryPoint<T> {
    /// Create an entry point with no engine bound. Calls to `handle` fail
    /// with [`IngressError::Configuration`] until one is set.
    pub fn new() -> Self {
        Self {
            binding: RwLock::new(None),
        }
    }

    /// Atomically replace the active engine and optional validator.
    pub fn use_ingress_handler(
        &self,
        handler: Arc<dyn IngressHandler<T>>,
        validator: Option<Arc<dyn RequestValidator<T>>>,
    ) {
        debug!(validated = validator.is_some(), "ingress handler replaced");
        *self.binding.write() = Some(Binding { handler, validator });
    }
}

impl<T: Send + 'static> Default for IngressEntryPoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> IngressHandler<T> for IngressEntryPoint<T> {
    /// Validate the request, then delegate to the active engine.
    ///
    /// Engine failures are wrapped as [`IngressError::Dispatch`] and
    /// re-raised, never swallowed.
    async fn handle(&self, request: T) -> Result<()> {
        let binding = self
            .binding
            .read()
            .clone()
            .ok_or(IngressError::Configuration)?;

        if let Some(validator) = &binding.validator {
            validator
                .validate(&request)
                .map_err(IngressError::Validation)?;
        }

        binding
            .handler
            .handle(request)
            .await
            .map_err(|err| IngressError::Dispatch(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl IngressHandler<String> for CountingHandler {
        async fn handle(&self, _request: String) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(IngressError::Forward("downstream gone".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_unbound_entry_point_fails() {
        let entry: IngressEntryPoint<String> = IngressEntryPoint::new();
        let err = entry.handle("request".into()).await.unwrap_err();
        assert!(matches!(err, IngressError::Configuration));
    }

    #[tokio::test]
    async fn test_delegates_without_validator() {
        let calls = Arc::new(AtomicU32::new(0));
        let entry = IngressEntryPoint::new();
        entry.use_ingress_handler(
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail: false,
            }),
            None,
        );

        entry.handle("request".into()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_blocks_dispatch() {
        let calls = Arc::new(AtomicU32::new(0));
        let entry = IngressEntryPoint::new();
        let validator = |request: &String| -> std::result::Result<(), BoxError> {
            if request.is_empty() {
                Err("empty payload".into())
            } else {
                Ok(())
            }
        };
        entry.use_ingress_handler(
            Arc::new(CountingHandler {
                calls: calls.clone(),
                fail: false,
            }),
            Some(Arc::new(validator)),
        );

        let err = entry.handle(String::new()).await.unwrap_err();
        assert!(matches!(err, IngressError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        entry.handle("request".into()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_wrapped_as_dispatch() {
        let entry = IngressEntryPoint::new();
        entry.use_ingress_handler(
            Arc::new(CountingHandler {
                calls: Arc::new(AtomicU32::new(0)),
                fail: true,
            }),
            None,
        );

        let err = entry.handle("request".into()).await.unwrap_err();
        match err {
            IngressError::Dispatch(inner) => {
                assert!(matches!(*inner, IngressError::Forward(_)))
            }
            other => panic!("expected Dispatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_swap_takes_effect() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let entry = IngressEntryPoint::new();

        entry.use_ingress_handler(
            Arc::new(CountingHandler {
                calls: first.clone(),
                fail: false,
            }),
            None,
        );
        entry.handle("request".into()).await.unwrap();

        entry.use_ingress_handler(
            Arc::new(CountingHandler {
                calls: second.clone(),
                fail: false,
            }),
            None,
        );
        entry.handle("request".into()).await.unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
