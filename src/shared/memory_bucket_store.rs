use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::{BucketKey, BucketStore, Clock, SystemClock, TollgateError};

#[derive(Debug)]
struct Lease {
    token: String,
    expires_at: Duration,
}

#[derive(Debug)]
struct Inner {
    clock: Arc<dyn Clock>,
    records: DashMap<BucketKey, HashMap<String, String>>,
    locks: DashMap<BucketKey, Lease>,
    unavailable: AtomicBool,
}

/// In-process [`BucketStore`].
///
/// Clones share the same maps, so several [`SharedTokenBucket`](crate::SharedTokenBucket)
/// handles over one store behave like several processes over one Redis. Lock leases expire
/// against the store's own clock.
#[derive(Clone, Debug)]
pub struct MemoryBucketStore {
    inner: Arc<Inner>,
}

impl Default for MemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucketStore {
    /// Create an empty store whose leases expire on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store whose leases expire on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                records: DashMap::new(),
                locks: DashMap::new(),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Delete a bucket record, as an operator or external job would.
    pub fn remove_record(&self, key: &BucketKey) -> bool {
        self.inner.records.remove(key).is_some()
    }

    /// Whether a lease on `key` is currently held.
    pub fn is_locked(&self, key: &BucketKey) -> bool {
        let now = self.inner.clock.now();

        self.inner
            .locks
            .get(key)
            .is_some_and(|lease| lease.expires_at > now)
    }

    /// Make every operation fail with [`TollgateError::StoreUnavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), TollgateError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(TollgateError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn read_record(
        &self,
        key: &BucketKey,
    ) -> Result<Option<HashMap<String, String>>, TollgateError> {
        self.ensure_available()?;

        Ok(self.inner.records.get(key).map(|record| record.clone()))
    }

    async fn write_record(
        &self,
        key: &BucketKey,
        fields: &[(&'static str, String)],
    ) -> Result<(), TollgateError> {
        self.ensure_available()?;

        let mut record = self.inner.records.entry(key.clone()).or_default();
        for (field, value) in fields {
            record.insert((*field).to_string(), value.clone());
        }

        Ok(())
    }

    async fn try_lock(
        &self,
        key: &BucketKey,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, TollgateError> {
        self.ensure_available()?;

        let now = self.inner.clock.now();
        let lease = Lease {
            token: token.to_string(),
            expires_at: now.saturating_add(ttl),
        };

        match self.inner.locks.entry(key.clone()) {
            Entry::Occupied(mut held) if held.get().expires_at <= now => {
                held.insert(lease);
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(free) => {
                free.insert(lease);
                Ok(true)
            }
        }
    }

    async fn unlock(&self, key: &BucketKey, token: &str) -> Result<(), TollgateError> {
        self.ensure_available()?;

        self.inner.locks.remove_if(key, |_, lease| lease.token == token);

        Ok(())
    }
}
