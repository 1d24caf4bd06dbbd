//! Shared key/value layer backing cross-replica counters, execution locks, and
//! cooldowns (§4.3, §4.7, §5), plus the 24h-TTL enrichment lookup cache (§4.1).

mod cache;
mod factory;
mod memory_kv;
mod redis_kv;
mod sled_kv;

pub use cache::AppCache;
pub use factory::create_kv_store;
pub use memory_kv::InMemoryKv;
pub use redis_kv::RedisKv;
pub use sled_kv::SledKv;

use crate::error::Result;
use async_trait::async_trait;

/// Cross-replica key/value primitives. A single trait covers both the Redis backend
/// (the default) and the embedded Sled fallback used when no Redis is configured, so
/// callers (feature extractors, the playbook executor) never branch on backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a string value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `SET key value NX EX ttl_secs` — returns `true` if the key was newly set, `false`
    /// if it already existed (and therefore still holds its previous TTL).
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    /// `INCR key`, creating the counter at 1 if absent. Used for per-(agent,event_type)
    /// feature counters (§4.3); callers apply their own TTL via `expire` if the counter
    /// should roll over.
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Reset a key's TTL without touching its value.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<()>;

    /// Delete a key unconditionally.
    async fn del(&self, key: &str) -> Result<()>;

    /// Delete a key only if its current value equals `expected` — the scoped lock
    /// release the executor uses so a replica can never drop another replica's lock
    /// (§4.7 step 2).
    async fn release_if_match(&self, key: &str, expected: &str) -> Result<bool>;
}
