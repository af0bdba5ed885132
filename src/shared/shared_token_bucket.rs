use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    BucketKey, BucketState, BucketStore, Capacity, Clock, LockTtl, RefillRate, SystemClock,
    TokenBucket, TollgateError, shared::bucket_store::BucketRecord,
};

/// Configuration for [`SharedTokenBucket`].
#[derive(Clone, Debug)]
pub struct SharedTokenBucketOptions {
    /// Maximum tokens held; a newly seeded record starts full.
    pub capacity: Capacity,
    /// Tokens added back per second.
    pub refill_rate: RefillRate,
    /// Lease time of the per-key distributed lock.
    pub lock_ttl: LockTtl,
}

/// Token bucket whose state lives in a [`BucketStore`] shared by many processes.
///
/// # Protocol
///
/// Every [`decide`](TokenBucket::decide) runs under the store's per-key lock:
///
/// 1. **Lock:** set-if-absent with [`LockTtl`]; if it is taken, fail with
///    [`TollgateError::Coordination`]
/// 2. **Load:** re-read `last_access` / `last_tokens` from the store
/// 3. **Refill / Check:** same arithmetic as the local backend
/// 4. **Consume:** if allowed, write both fields back
/// 5. **Unlock:** always attempted, whatever happened before
///
/// The write in step 4 is the last store mutation, so a failure anywhere earlier leaves the
/// persisted record untouched.
///
/// # Semantics & Limitations
///
/// **Store is the authority:**
/// - The handle keeps a shadow of the last state it saw, for [`TokenBucket::snapshot`]
/// - The shadow is never used for a decision; another process may have moved on
///
/// **No retries:**
/// - A contended lock surfaces immediately as an error, it does not queue
/// - Callers pick fail-open or fail-closed and may retry themselves
///
/// **Whole-second resolution:**
/// - `last_access` is stored in unix seconds, so every decision reads the clock truncated
///   to the second
/// - Refill is credited per whole-second boundary crossed: at rate 2, going from `x.6` to
///   `(x+1).1` earns 2 tokens, going from `x.1` to `x.9` earns none
///
/// **Stale leases:**
/// - If a holder stalls past its TTL, a second process can take the lock while the first
///   still writes. Lock tokens stop the stalled holder from releasing the newcomer's lock,
///   but its late write can still land.
///
/// **Cancellation:**
/// - Dropping the `decide` future after the lock is taken skips the release; the lock then
///   expires after its TTL.
///
/// # Examples
///
/// ```
/// use tollgate::{
///     BucketKey, Capacity, LockTtl, MemoryBucketStore, RefillRate, SharedTokenBucket,
///     SharedTokenBucketOptions, TokenBucket,
/// };
///
/// # smol::block_on(async {
/// let store = MemoryBucketStore::new();
/// let options = SharedTokenBucketOptions {
///     capacity: Capacity::try_from(1).unwrap(),
///     refill_rate: RefillRate::try_from(1).unwrap(),
///     lock_ttl: LockTtl::default(),
/// };
/// let key = BucketKey::try_from("partner_api").unwrap();
///
/// // Two "processes" sharing one key.
/// let a = SharedTokenBucket::new(store.clone(), key.clone(), options.clone()).await.unwrap();
/// let b = SharedTokenBucket::new(store, key, options).await.unwrap();
///
/// assert!(a.decide().await.unwrap());
/// assert!(!b.decide().await.unwrap());
/// # });
/// ```
#[derive(Debug)]
pub struct SharedTokenBucket<S> {
    store: S,
    key: BucketKey,
    capacity: Capacity,
    refill_rate: RefillRate,
    lock_ttl: LockTtl,
    clock: Arc<dyn Clock>,
    shadow: Mutex<BucketState>,
}

impl<S> SharedTokenBucket<S>
where
    S: BucketStore,
{
    /// Attach to (or create) the bucket stored under `key`, using the system clock.
    ///
    /// # Errors
    ///
    /// - [`TollgateError::Coordination`] if the lock is held or cannot be requested
    /// - [`TollgateError::CorruptState`] if an existing record cannot be parsed
    /// - store errors from reading or seeding the record
    pub async fn new(
        store: S,
        key: BucketKey,
        options: SharedTokenBucketOptions,
    ) -> Result<Self, TollgateError> {
        Self::with_clock(store, key, options, Arc::new(SystemClock)).await
    }

    /// Attach to (or create) the bucket stored under `key`, using `clock`.
    pub async fn with_clock(
        store: S,
        key: BucketKey,
        options: SharedTokenBucketOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TollgateError> {
        let now = whole_seconds(clock.now());

        let bucket = Self {
            store,
            key,
            capacity: options.capacity,
            refill_rate: options.refill_rate,
            lock_ttl: options.lock_ttl,
            shadow: Mutex::new(BucketState::full(options.capacity, options.refill_rate, now)),
            clock,
        };

        let token = bucket.acquire_lock().await?;
        let hydrated = bucket.hydrate_or_seed(now).await;
        bucket.finish_locked(&token, hydrated).await?;

        Ok(bucket)
    } // end constructor

    /// Key this bucket is stored under.
    pub fn key(&self) -> &BucketKey {
        &self.key
    }

    /// The store handle.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn hydrate_or_seed(&self, now: Duration) -> Result<(), TollgateError> {
        let state = match self.store.read_record(&self.key).await? {
            Some(fields) if !fields.is_empty() => {
                let record = BucketRecord::parse(&self.key, &fields)
                    .inspect_err(|err| tracing::warn!(key = %self.key, error = %err, "shared.hydrate, corrupt record"))?;
                self.restore(record)
            }
            _ => {
                let state = BucketState::full(self.capacity, self.refill_rate, now);
                self.persist(&state).await?;
                tracing::debug!(key = %self.key, capacity = *self.capacity, "shared.seed, created bucket record");
                state
            }
        };

        *self.shadow.lock() = state;
        Ok(())
    }

    async fn decide_locked(&self) -> Result<bool, TollgateError> {
        let mut state = self.load().await?;
        let now = whole_seconds(self.clock.now());

        let refilled = state.refill(now);

        if !state.check() {
            *self.shadow.lock() = state;
            tracing::debug!(key = %self.key, refilled, "shared.decide, bucket empty");
            return Ok(false);
        }

        self.consume(&mut state, now).await?;

        tracing::debug!(key = %self.key, refilled, tokens = state.tokens(), "shared.decide, allowed");
        Ok(true)
    }

    /// Re-read the authoritative state. A missing record is treated as corrupt: it was
    /// seeded at construction and the core never deletes it.
    async fn load(&self) -> Result<BucketState, TollgateError> {
        let Some(fields) = self
            .store
            .read_record(&self.key)
            .await?
            .filter(|fields| !fields.is_empty())
        else {
            return Err(TollgateError::CorruptState {
                key: self.key.to_string(),
                field: crate::LAST_ACCESS_FIELD,
                value: None,
            });
        };

        let record = BucketRecord::parse(&self.key, &fields)?;
        Ok(self.restore(record))
    }

    async fn consume(&self, state: &mut BucketState, now: Duration) -> Result<(), TollgateError> {
        let mut next = *state;
        next.consume(now);

        self.persist(&next).await?;

        *state = next;
        *self.shadow.lock() = next;
        Ok(())
    }

    async fn persist(&self, state: &BucketState) -> Result<(), TollgateError> {
        let record = BucketRecord {
            last_access_secs: state.last_update().as_secs(),
            last_tokens: state.tokens(),
        };

        self.store.write_record(&self.key, &record.to_fields()).await
    }

    fn restore(&self, record: BucketRecord) -> BucketState {
        BucketState::restore(
            self.capacity,
            self.refill_rate,
            record.last_tokens,
            Duration::from_secs(record.last_access_secs),
        )
    }

    async fn acquire_lock(&self) -> Result<String, TollgateError> {
        let token = format!("{:016x}", rand::random::<u64>());

        match self.store.try_lock(&self.key, &token, *self.lock_ttl).await {
            Ok(true) => Ok(token),
            Ok(false) => {
                tracing::warn!(key = %self.key, "shared.lock, lock held by another caller");
                Err(TollgateError::Coordination {
                    key: self.key.to_string(),
                    source: None,
                })
            }
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "shared.lock, lock request failed");
                Err(TollgateError::Coordination {
                    key: self.key.to_string(),
                    source: Some(Box::new(err)),
                })
            }
        }
    }

    /// Release the lock and merge the release outcome with the work done under it.
    ///
    /// An error from the locked section takes precedence over a release failure.
    async fn finish_locked<T>(
        &self,
        token: &str,
        outcome: Result<T, TollgateError>,
    ) -> Result<T, TollgateError> {
        let released = self.store.unlock(&self.key, token).await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => {
                tracing::error!(key = %self.key, error = %release_err, "shared.unlock, failed to release lock");
                Err(release_err)
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                tracing::error!(key = %self.key, error = %release_err, "shared.unlock, failed to release lock after error");
                Err(err)
            }
        }
    }
}

/// Truncate to the resolution of `last_access`, so a reloaded record never refunds the
/// sub-second part of its own timestamp.
fn whole_seconds(now: Duration) -> Duration {
    Duration::from_secs(now.as_secs())
}

#[async_trait]
impl<S> TokenBucket for SharedTokenBucket<S>
where
    S: BucketStore,
{
    async fn decide(&self) -> Result<bool, TollgateError> {
        let token = self.acquire_lock().await?;
        let outcome = self.decide_locked().await;

        self.finish_locked(&token, outcome).await
    }

    fn snapshot(&self) -> BucketState {
        *self.shadow.lock()
    }
}
