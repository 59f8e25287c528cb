//! Rate limiting engines and the shared handler plumbing.

mod fixed_window;
mod handler;
mod leaky_bucket;
mod sliding_window;
mod sweep;
mod token_bucket;

pub use fixed_window::FixedWindowLimiter;
pub use handler::{
    drop_fn, forward_fn, try_drop, try_forward, DropCallback, ForwardCallback, IngressHandler,
    BLANK_IDENTITY_REASON,
};
pub use leaky_bucket::LeakyBucketLimiter;
pub use sliding_window::SlidingWindowLimiter;
pub use token_bucket::TokenBucketLimiter;
