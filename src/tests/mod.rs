
mod test_common_validation;
mod test_decision_logging;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod test_redis_bucket_store;
