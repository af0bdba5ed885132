//! In-process token bucket.
//!
//! The local backend keeps bucket state in the current process behind one mutex.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** Safe for concurrent use across multiple threads
//! - **No I/O:** Decisions never touch the network and never fail
//! - **Process-scoped:** State is not shared across processes
//!
//! # When to Use
//!
//! ✅ **Use the local backend when:**
//! - One process owns the budget (e.g. outbound calls to a third-party API)
//! - Low-latency requirements
//!
//! ❌ **Don't use the local backend when:**
//! - Several instances must share one budget
//! - Limits must survive process restarts
//! - You need one bucket per end user at scale

mod local_token_bucket;
pub use local_token_bucket::*;
