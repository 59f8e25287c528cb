//! Floodgate - Ingress Admission Control
//!
//! This crate decides, per incoming request, whether to forward the request
//! downstream or drop it, according to one of four interchangeable
//! rate-limiting algorithms: fixed window, sliding window, token bucket and
//! leaky bucket. Requests enter through an [`entry::IngressEntryPoint`]
//! holding a pluggable engine and an optional validator; every engine tracks
//! state per client identity and settles each request through exactly one of
//! two injected async callbacks, forward or drop.

pub mod config;
pub mod entry;
pub mod error;
pub mod limiter;
pub mod request;
pub mod sim;
