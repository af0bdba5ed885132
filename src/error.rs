/// Error type for this crate.
///
/// A rate-limit denial is never an error: [`TokenBucket::decide`](crate::TokenBucket::decide)
/// reports it as `Ok(false)`. Every variant here means the outcome of the call is unknown.
#[derive(Debug, thiserror::Error)]
pub enum TollgateError {
    /// The distributed lock for a bucket could not be acquired.
    ///
    /// Either another process holds it, or the store could not be reached while trying to
    /// take it. Callers decide whether to fail open or closed.
    #[error("could not acquire lock for bucket `{key}`")]
    Coordination {
        /// Bucket key whose lock was requested.
        key: String,
        /// Underlying store failure, if the lock attempt itself errored.
        #[source]
        source: Option<Box<TollgateError>>,
    },

    /// Redis error.
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// A non-Redis store could not serve the request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A persisted bucket field is missing or cannot be parsed.
    #[error("corrupt bucket state for `{key}`: field `{field}` has value {value:?}")]
    CorruptState {
        /// Bucket key of the corrupt record.
        key: String,
        /// Name of the offending field.
        field: &'static str,
        /// Raw value found in the store, if any.
        value: Option<String>,
    },
}

impl TollgateError {
    /// Returns `true` if this error is a lock acquisition failure.
    pub fn is_coordination(&self) -> bool {
        matches!(self, Self::Coordination { .. })
    }
}
