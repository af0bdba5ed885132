use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{BucketKey, TollgateError};

/// Field holding the unix second of the last refill/consume.
pub const LAST_ACCESS_FIELD: &str = "last_access";

/// Field holding the token count at `last_access`.
pub const LAST_TOKENS_FIELD: &str = "last_tokens";

/// Storage operations a [`SharedTokenBucket`](crate::SharedTokenBucket) needs.
///
/// A bucket record is a flat map of string fields under the bucket key. The lock is a
/// lease keyed by the same bucket key: set-if-absent with a TTL, holding an opaque token
/// chosen by the caller.
///
/// Implementations are cheap handles; every bucket clones or shares one.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Read every field of the record, or `None` if there is no record.
    async fn read_record(
        &self,
        key: &BucketKey,
    ) -> Result<Option<HashMap<String, String>>, TollgateError>;

    /// Write (create or overwrite) the given fields of the record.
    async fn write_record(
        &self,
        key: &BucketKey,
        fields: &[(&'static str, String)],
    ) -> Result<(), TollgateError>;

    /// Take the lock for `key` if nobody holds an unexpired lease on it.
    ///
    /// Returns `Ok(false)` when the lock is held by someone else.
    async fn try_lock(
        &self,
        key: &BucketKey,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, TollgateError>;

    /// Release the lock for `key` if it is still held with `token`.
    ///
    /// Releasing a lock that expired or was taken over is not an error.
    async fn unlock(&self, key: &BucketKey, token: &str) -> Result<(), TollgateError>;
}

#[async_trait]
impl<S> BucketStore for Arc<S>
where
    S: BucketStore + ?Sized,
{
    async fn read_record(
        &self,
        key: &BucketKey,
    ) -> Result<Option<HashMap<String, String>>, TollgateError> {
        (**self).read_record(key).await
    }

    async fn write_record(
        &self,
        key: &BucketKey,
        fields: &[(&'static str, String)],
    ) -> Result<(), TollgateError> {
        (**self).write_record(key, fields).await
    }

    async fn try_lock(
        &self,
        key: &BucketKey,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, TollgateError> {
        (**self).try_lock(key, token, ttl).await
    }

    async fn unlock(&self, key: &BucketKey, token: &str) -> Result<(), TollgateError> {
        (**self).unlock(key, token).await
    }
}

/// Persisted form of a shared bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BucketRecord {
    pub last_access_secs: u64,
    pub last_tokens: u64,
}

impl BucketRecord {
    pub(crate) fn to_fields(self) -> [(&'static str, String); 2] {
        [
            (LAST_ACCESS_FIELD, self.last_access_secs.to_string()),
            (LAST_TOKENS_FIELD, self.last_tokens.to_string()),
        ]
    }

    /// Parse a raw record.
    ///
    /// Missing or malformed fields are a hard error. Defaulting them to a full bucket would
    /// let any writer reset the limit.
    pub(crate) fn parse(
        key: &BucketKey,
        fields: &HashMap<String, String>,
    ) -> Result<Self, TollgateError> {
        let last_access_secs = parse_field(key, fields, LAST_ACCESS_FIELD, |raw| {
            raw.trim().parse::<u64>().ok()
        })?;
        let last_tokens = parse_field(key, fields, LAST_TOKENS_FIELD, parse_token_count)?;

        Ok(Self {
            last_access_secs,
            last_tokens,
        })
    }
}

fn parse_field(
    key: &BucketKey,
    fields: &HashMap<String, String>,
    field: &'static str,
    parse: impl Fn(&str) -> Option<u64>,
) -> Result<u64, TollgateError> {
    let raw = fields.get(field);

    raw.and_then(|raw| parse(raw))
        .ok_or_else(|| TollgateError::CorruptState {
            key: key.to_string(),
            field,
            value: raw.cloned(),
        })
}

/// Token counts are written as integers but older writers used float formatting
/// (`"4"`, `"4.0"`). Only non-negative whole numbers are accepted.
fn parse_token_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();

    if let Ok(n) = raw.parse::<u64>() {
        return Some(n);
    }

    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}
