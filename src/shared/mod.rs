//! Token bucket shared through an external store.
//!
//! State lives in a [`BucketStore`] under a caller-chosen [`BucketKey`](crate::BucketKey).
//! Any number of processes can attach to the same key; a per-key lock with a short TTL
//! serializes their read-modify-write cycles.
//!
//! # Stores
//!
//! - [`MemoryBucketStore`]: in-process, for tests and single-host simulations
//! - `RedisBucketStore`: Redis, behind the `redis-tokio` / `redis-smol` features
//!
//! # Persisted Record
//!
//! | field | encoding |
//! |---|---|
//! | `last_access` | decimal string, unix seconds |
//! | `last_tokens` | decimal string |

mod bucket_store;
pub use bucket_store::*;

mod memory_bucket_store;
pub use memory_bucket_store::*;

mod shared_token_bucket;
pub use shared_token_bucket::*;
