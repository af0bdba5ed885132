use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    BucketState, Capacity, Clock, RefillRate, SystemClock, TokenBucket, TollgateError,
};

/// Configuration for [`LocalTokenBucket`].
#[derive(Clone, Debug)]
pub struct LocalTokenBucketOptions {
    /// Maximum tokens held; the bucket starts full.
    pub capacity: Capacity,
    /// Tokens added back per second.
    pub refill_rate: RefillRate,
}

/// Token bucket whose state lives in process memory.
///
/// # Algorithm
///
/// 1. **Load:** nothing to do, the in-memory state is authoritative
/// 2. **Refill:** add `floor(elapsed_seconds * refill_rate)` tokens, capped at capacity
/// 3. **Check:** allow if at least one token remains
/// 4. **Consume:** take the token and stamp the time
///
/// # Thread Safety
///
/// A single [`parking_lot::Mutex`] guards the whole sequence, so concurrent callers never
/// observe or create a state outside `0..=capacity`. Waiters are not served in FIFO order.
///
/// # Semantics & Limitations
///
/// **Fractional credit is dropped:**
/// - Every refill that earns a token and every consume resets the refill clock to `now`
/// - The unearned fraction of the current token is lost
/// - At low rates this under-refills slightly over the long run
///
/// **Process-scoped:**
/// - Not shared across processes, not persisted
/// - Meant for limiting outbound calls to a third-party API from one process, not for
///   per-end-user limits (one bucket per user costs memory on every instance)
///
/// # Examples
///
/// ```
/// use tollgate::{Capacity, LocalTokenBucket, LocalTokenBucketOptions, RefillRate};
///
/// let bucket = LocalTokenBucket::new(LocalTokenBucketOptions {
///     capacity: Capacity::try_from(2).unwrap(),
///     refill_rate: RefillRate::try_from(1).unwrap(),
/// });
///
/// assert!(bucket.allow());
/// assert!(bucket.allow());
/// assert!(!bucket.allow());
/// ```
#[derive(Debug)]
pub struct LocalTokenBucket {
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl LocalTokenBucket {
    /// Create a full bucket driven by the system clock.
    pub fn new(options: LocalTokenBucketOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Create a full bucket driven by `clock`.
    pub fn with_clock(options: LocalTokenBucketOptions, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();

        Self {
            state: Mutex::new(BucketState::full(
                options.capacity,
                options.refill_rate,
                now,
            )),
            clock,
        }
    } // end constructor

    /// Take a token if one is available.
    ///
    /// Synchronous and infallible: the only blocking point is the internal mutex.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock();
        let now = self.clock.now();

        let refilled = state.refill(now);

        if !state.check() {
            tracing::debug!(refilled, "local.decide, bucket empty");
            return false;
        }

        let allowed = state.consume(now);

        tracing::debug!(refilled, tokens = state.tokens(), "local.decide, allowed");
        allowed
    } // end method allow
}

#[async_trait]
impl TokenBucket for LocalTokenBucket {
    async fn decide(&self) -> Result<bool, TollgateError> {
        Ok(self.allow())
    }

    fn snapshot(&self) -> BucketState {
        *self.state.lock()
    }
}
