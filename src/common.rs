use std::{ops::Deref, sync::Arc, time::Duration};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Maximum number of tokens a bucket can hold.
///
/// Must be at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capacity(u64);

impl Deref for Capacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Capacity {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Capacity must be at least 1")
        } else {
            Ok(Self(value))
        }
    }
}

/// Tokens added back to a bucket per second.
///
/// Must be at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefillRate(u64);

impl Deref for RefillRate {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for RefillRate {
    type Error = &'static str;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value < 1 {
            Err("Refill rate must be at least 1")
        } else {
            Ok(Self(value))
        }
    }
}

/// Lease time of the distributed lock taken around every shared bucket decision.
///
/// A holder that dies without releasing the lock blocks the key for at most this long.
/// Longer leases make stale-holder races less likely; shorter ones recover faster.
/// Defaults to 5 seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockTtl(Duration);

impl Default for LockTtl {
    fn default() -> Self {
        Self(Duration::from_secs(5))
    }
}

impl Deref for LockTtl {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Duration> for LockTtl {
    type Error = &'static str;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        // Redis PX takes whole milliseconds.
        if value.as_millis() == 0 {
            Err("Lock TTL must be at least 1ms")
        } else {
            Ok(Self(value))
        }
    }
}

/// A validated newtype for bucket keys.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
///
/// Colons are reserved for the separators of derived store keys (e.g. the lock key), so a
/// user key can never collide with another bucket's lock.
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct BucketKey(Arc<str>);

impl BucketKey {
    /// Create a new default prefix.
    pub fn default_prefix() -> Self {
        Self(Arc::from("tollgate"))
    }
}

impl Deref for BucketKey {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BucketKey {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err("Bucket key must not be empty")
        } else if value.len() > 255 {
            Err("Bucket key must not be longer than 255 characters")
        } else if value.contains(':') {
            Err("Bucket key must not contain colons")
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for BucketKey {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Point-in-time view of a token bucket.
///
/// Holds the four values every backend tracks and the arithmetic that moves them forward.
/// Timestamps are durations since the Unix epoch as reported by a [`Clock`](crate::Clock).
///
/// Invariant: `0 <= tokens <= capacity`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketState {
    capacity: u64,
    refill_rate: u64,
    tokens: u64,
    last_update: Duration,
}

impl BucketState {
    /// A bucket holding `capacity` tokens, last updated at `now`.
    pub(crate) fn full(capacity: Capacity, refill_rate: RefillRate, now: Duration) -> Self {
        Self {
            capacity: *capacity,
            refill_rate: *refill_rate,
            tokens: *capacity,
            last_update: now,
        }
    }

    /// Rebuild a bucket from persisted values.
    ///
    /// Token counts above `capacity` (e.g. a record written under a larger capacity) are
    /// clamped down.
    pub(crate) fn restore(
        capacity: Capacity,
        refill_rate: RefillRate,
        tokens: u64,
        last_update: Duration,
    ) -> Self {
        Self {
            capacity: *capacity,
            refill_rate: *refill_rate,
            tokens: tokens.min(*capacity),
            last_update,
        }
    }

    /// Maximum tokens held.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens replenished per second.
    pub fn refill_rate(&self) -> u64 {
        self.refill_rate
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Time of the last refill or consume, since the Unix epoch.
    pub fn last_update(&self) -> Duration {
        self.last_update
    }

    /// Credit the tokens earned since `last_update`, saturating at capacity.
    ///
    /// `earned = floor(elapsed_seconds * refill_rate)`. When at least one token is earned,
    /// `last_update` jumps to `now` and the fractional remainder is dropped. Returns the
    /// number of tokens actually added.
    pub(crate) fn refill(&mut self, now: Duration) -> u64 {
        let elapsed = now.saturating_sub(self.last_update);
        let earned = elapsed.as_nanos() * self.refill_rate as u128 / NANOS_PER_SEC;

        if earned == 0 {
            return 0;
        }

        let before = self.tokens;
        let room = (self.capacity - self.tokens) as u128;
        self.tokens += earned.min(room) as u64;
        self.last_update = self.last_update.max(now);

        self.tokens - before
    }

    /// Whether at least one token is available.
    pub(crate) fn check(&self) -> bool {
        self.tokens >= 1
    }

    /// Take one token if there is one, and stamp `now`.
    ///
    /// Returns `false` when the bucket was already empty; the decrement saturates at 0.
    pub(crate) fn consume(&mut self, now: Duration) -> bool {
        self.last_update = self.last_update.max(now);

        if self.tokens == 0 {
            return false;
        }

        self.tokens -= 1;
        true
    }
}
