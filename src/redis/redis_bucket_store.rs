use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use crate::{BucketKey, BucketStore, TollgateError, redis::RedisKeyGenerator};

/// Configuration for [`RedisBucketStore`].
///
/// # Examples
///
/// ```ignore
/// use tollgate::{BucketKey, RedisBucketStore, RedisBucketStoreOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let store = RedisBucketStore::new(RedisBucketStoreOptions {
///     connection_manager,
///     prefix: Some(BucketKey::try_from("myapp")?), // Keys: myapp:<key>:bucket
/// });
/// ```
#[derive(Clone)]
pub struct RedisBucketStoreOptions {
    /// Redis connection manager from the `redis` crate.
    ///
    /// Use `ConnectionManager` for automatic reconnection.
    pub connection_manager: ConnectionManager,

    /// Optional prefix for all Redis keys.
    ///
    /// If provided, keys look like `<prefix>:<bucket_key>:bucket`.
    /// If `None`, defaults to `"tollgate"`.
    pub prefix: Option<BucketKey>,
}

/// [`BucketStore`] over Redis.
///
/// # Data Model
///
/// - `<prefix>:<key>:bucket`: hash with `last_access` and `last_tokens`
/// - `<prefix>:<key>:lock`: string holding the current holder's token, set with `NX PX`
///
/// Release runs a Lua compare-and-delete so a holder whose lease already expired cannot
/// delete a successor's lock. Records never expire; delete them out of band if needed.
#[derive(Clone)]
pub struct RedisBucketStore {
    connection_manager: ConnectionManager,
    key_generator: Arc<RedisKeyGenerator>,
}

impl std::fmt::Debug for RedisBucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBucketStore")
            .field("prefix", &self.key_generator.prefix)
            .finish_non_exhaustive()
    }
}

impl RedisBucketStore {
    /// Create a new store.
    pub fn new(options: RedisBucketStoreOptions) -> Self {
        let prefix = options.prefix.unwrap_or_else(BucketKey::default_prefix);

        Self {
            connection_manager: options.connection_manager,
            key_generator: Arc::new(RedisKeyGenerator::new(prefix)),
        }
    }

    /// Redis key holding the record of `key`.
    pub fn record_key(&self, key: &BucketKey) -> Arc<str> {
        self.key_generator.get_record_key(key)
    }

    /// Redis key holding the lock of `key`.
    pub fn lock_key(&self, key: &BucketKey) -> Arc<str> {
        self.key_generator.get_lock_key(key)
    }
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn read_record(
        &self,
        key: &BucketKey,
    ) -> Result<Option<HashMap<String, String>>, TollgateError> {
        let record_key = self.key_generator.get_record_key(key);
        let mut connection_manager = self.connection_manager.clone();

        let fields: HashMap<String, String> = connection_manager.hgetall(&*record_key).await?;

        // HGETALL answers an empty map for a missing key.
        if fields.is_empty() {
            Ok(None)
        } else {
            Ok(Some(fields))
        }
    }

    async fn write_record(
        &self,
        key: &BucketKey,
        fields: &[(&'static str, String)],
    ) -> Result<(), TollgateError> {
        let record_key = self.key_generator.get_record_key(key);
        let mut connection_manager = self.connection_manager.clone();

        let () = connection_manager
            .hset_multiple(&*record_key, fields)
            .await?;

        Ok(())
    }

    async fn try_lock(
        &self,
        key: &BucketKey,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, TollgateError> {
        let lock_key = self.key_generator.get_lock_key(key);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut connection_manager = self.connection_manager.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&*lock_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut connection_manager)
            .await?;

        Ok(reply.is_some())
    }

    async fn unlock(&self, key: &BucketKey, token: &str) -> Result<(), TollgateError> {
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            end

            return 0
        "#,
        );

        let lock_key = self.key_generator.get_lock_key(key);
        let mut connection_manager = self.connection_manager.clone();

        let released: u64 = script
            .key(&*lock_key)
            .arg(token)
            .invoke_async(&mut connection_manager)
            .await?;

        if released == 0 {
            tracing::debug!(key = %key, "redis.unlock, lock already expired or taken over");
        }

        Ok(())
    }
}
