//! Cooperative cancellation
//!
//! Clones of a token observe the same signal. Long-running work only checks
//! it at its poll points, so an in-flight source call always runs to
//! completion. `cancel` and `is_cancelled` are plain synchronous calls; no
//! async runtime is involved.

pub use tokio_util::sync::CancellationToken as CancelToken;
