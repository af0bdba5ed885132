//! Redis-backed [`BucketStore`](crate::BucketStore).
//!
//! Requires Redis >= 2.6.12 (`SET ... NX PX` and Lua scripting) and one of the
//! `redis-tokio` / `redis-smol` features.

mod common;
pub(crate) use common::*;

mod redis_bucket_store;
pub use redis_bucket_store::*;
