use std::sync::Arc;

use dashmap::DashMap;

use crate::BucketKey;

/// Derives the physical Redis keys of a bucket.
///
/// The record and its lock need separate Redis keys because one key cannot be both a hash
/// and a string:
///
/// - record: `<prefix>:<key>:bucket`
/// - lock: `<prefix>:<key>:lock`
#[derive(Clone, Debug)]
pub(crate) struct RedisKeyGenerator {
    pub prefix: BucketKey,
    pub record_key_suffix: String,
    pub lock_key_suffix: String,

    // caches
    record_key_cache: DashMap<BucketKey, Arc<str>>,
    lock_key_cache: DashMap<BucketKey, Arc<str>>,
}

impl RedisKeyGenerator {
    pub(crate) fn new(prefix: BucketKey) -> Self {
        Self {
            prefix,
            record_key_suffix: "bucket".to_string(),
            lock_key_suffix: "lock".to_string(),
            record_key_cache: DashMap::new(),
            lock_key_cache: DashMap::new(),
        }
    }

    fn get_key_with_suffix(&self, key: &BucketKey, suffix: &str) -> String {
        format!("{}:{}:{}", *self.prefix, **key, suffix)
    }

    fn cached(
        &self,
        cache: &DashMap<BucketKey, Arc<str>>,
        key: &BucketKey,
        suffix: &str,
    ) -> Arc<str> {
        match cache.get(key) {
            Some(value) => value.clone(),
            None => {
                let value: Arc<str> = Arc::from(self.get_key_with_suffix(key, suffix));
                cache.insert(key.clone(), value.clone());

                value
            }
        }
    }

    pub(crate) fn get_record_key(&self, key: &BucketKey) -> Arc<str> {
        self.cached(&self.record_key_cache, key, &self.record_key_suffix)
    }

    pub(crate) fn get_lock_key(&self, key: &BucketKey) -> Arc<str> {
        self.cached(&self.lock_key_cache, key, &self.lock_key_suffix)
    }
}
