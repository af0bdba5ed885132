//! Backend-agnostic entrypoint.
//!
//! Both [`LocalTokenBucket`](crate::LocalTokenBucket) and
//! [`SharedTokenBucket`](crate::SharedTokenBucket) implement [`TokenBucket`], so callers can
//! hold a `Box<dyn TokenBucket>` or `Arc<dyn TokenBucket>` and switch backends through
//! configuration alone.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{BucketState, TollgateError};

/// A token bucket rate limiter.
///
/// Every implementation runs the same sequence inside [`decide`](TokenBucket::decide):
///
/// 1. **Load:** hydrate state from the backend's authority
/// 2. **Refill:** credit `floor(elapsed_seconds * refill_rate)` tokens, capped at capacity
/// 3. **Check:** at least one token available?
/// 4. **Consume:** if so, take one token and persist
///
/// The whole sequence is serialized per bucket: by a mutex for the local backend, by a
/// distributed lock for the shared one.
#[async_trait]
pub trait TokenBucket: Send + Sync {
    /// Decide whether one unit of work may proceed, consuming a token if so.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: a token was consumed
    /// - `Ok(false)`: the bucket is empty, nothing was consumed
    /// - `Err(_)`: the outcome is unknown (store or coordination failure); this is
    ///   **not** a denial
    async fn decide(&self) -> Result<bool, TollgateError>;

    /// Last state observed by this handle.
    ///
    /// Authoritative for local buckets. For shared buckets it is the shadow copy from the
    /// most recent decision and may already be stale.
    fn snapshot(&self) -> BucketState;
}

#[async_trait]
impl<T> TokenBucket for Arc<T>
where
    T: TokenBucket + ?Sized,
{
    async fn decide(&self) -> Result<bool, TollgateError> {
        (**self).decide().await
    }

    fn snapshot(&self) -> BucketState {
        (**self).snapshot()
    }
}

#[async_trait]
impl<T> TokenBucket for Box<T>
where
    T: TokenBucket + ?Sized,
{
    async fn decide(&self) -> Result<bool, TollgateError> {
        (**self).decide().await
    }

    fn snapshot(&self) -> BucketState {
        (**self).snapshot()
    }
}
